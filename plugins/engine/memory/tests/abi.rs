use std::mem::{align_of, size_of};

use quiver_abi::ffi::{QV_ABI_VERSION, QV_ERROR, QV_SUCCESS};
use quiver_abi::{Interval, ListEntry, StringElement, TypeTag};
use quiver_engine_memory::{STANDARD_VECTOR_SIZE, api, live_handles, qv_abi_version};

#[test]
fn element_layouts_match_engine() {
    assert_eq!(size_of::<StringElement>(), 16);
    assert_eq!(align_of::<StringElement>(), 8);
    assert_eq!(size_of::<ListEntry>(), 16);
    assert_eq!(size_of::<Interval>(), 16);
    assert_eq!(qv_abi_version(), QV_ABI_VERSION);
    assert_eq!(unsafe { (api().vector_size)() }, STANDARD_VECTOR_SIZE as u64);
}

#[test]
fn chunk_vectors_through_function_table() {
    let api = api();
    let before = live_handles();
    unsafe {
        let mut int = (api.create_logical_type)(TypeTag::Integer.as_raw());
        let mut list = (api.create_list_type)(int);
        let types = [int, list];
        let mut chunk = (api.create_data_chunk)(types.as_ptr(), 2);
        assert_eq!((api.data_chunk_get_column_count)(chunk), 2);

        let ints = (api.data_chunk_get_vector)(chunk, 0);
        let data = (api.vector_get_data)(ints).cast::<i32>();
        *data.add(1) = 42;
        assert!((api.vector_get_validity)(ints).is_null());
        (api.vector_ensure_validity_writable)(ints);
        let validity = (api.vector_get_validity)(ints);
        assert_eq!(*validity, u64::MAX);
        *validity &= !1;

        let lists = (api.data_chunk_get_vector)(chunk, 1);
        assert_eq!((api.list_vector_set_size)(lists, 10_000), QV_ERROR);
        assert_eq!((api.list_vector_reserve)(lists, 10_000), QV_SUCCESS);
        assert_eq!((api.list_vector_set_size)(lists, 10_000), QV_SUCCESS);
        assert_eq!((api.list_vector_get_size)(lists), 10_000);
        let child = (api.list_vector_get_child)(lists);
        assert_eq!(
            TypeTag::from_raw((api.get_type_id)((api.vector_get_column_type)(child))),
            TypeTag::Integer
        );

        (api.data_chunk_set_size)(chunk, 2);
        assert_eq!((api.data_chunk_get_size)(chunk), 2);
        (api.data_chunk_reset)(chunk);
        assert_eq!((api.data_chunk_get_size)(chunk), 0);
        assert_eq!((api.list_vector_get_size)(lists), 0);

        (api.destroy_data_chunk)(&mut chunk);
        assert!(chunk.is_null());
        (api.destroy_logical_type)(&mut list);
        (api.destroy_logical_type)(&mut int);
    }
    assert_eq!(live_handles(), before);
}

#[test]
fn strings_use_inline_and_pointer_forms() {
    let api = api();
    let before = live_handles();
    unsafe {
        let mut ty = (api.create_logical_type)(TypeTag::Varchar.as_raw());
        let mut vector = (api.create_vector)(ty, 2);
        let short = b"hello";
        let long = b"a string longer than twelve bytes";
        (api.vector_assign_string_element_len)(vector, 0, short.as_ptr().cast(), short.len() as u64);
        (api.vector_assign_string_element_len)(vector, 1, long.as_ptr().cast(), long.len() as u64);

        let elements = std::slice::from_raw_parts((api.vector_get_data)(vector).cast::<StringElement>(), 2);
        assert!(elements[0].is_inlined());
        assert!(!elements[1].is_inlined());
        assert_eq!(elements[0].as_bytes(), short);
        assert_eq!(elements[1].as_bytes(), long);
        // The engine copied the bytes into its own heap.
        assert_ne!(elements[1].pointer.ptr, long.as_ptr());

        (api.destroy_vector)(&mut vector);
        (api.destroy_logical_type)(&mut ty);
    }
    assert_eq!(live_handles(), before);
}

#[test]
fn engine_allocator_round_trip() {
    let api = api();
    let before = live_handles();
    unsafe {
        let ptr = (api.malloc)(64).cast::<u8>();
        assert!(!ptr.is_null());
        ptr.write_bytes(0xAB, 64);
        assert_eq!(*ptr.add(63), 0xAB);
        (api.free)(ptr.cast());
        (api.free)(std::ptr::null_mut());
    }
    assert_eq!(live_handles(), before);
}
