use std::{
    alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout},
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice::{from_raw_parts, from_raw_parts_mut},
};

/// 按 8 字节对齐、零初始化的存储区。
pub struct Blob {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for Blob {}
unsafe impl Sync for Blob {}

impl Blob {
    #[inline]
    pub fn new(size: usize) -> Self {
        let layout = layout(size);
        let Some(ptr) = NonNull::new(unsafe { alloc_zeroed(layout) }) else {
            handle_alloc_error(layout)
        };
        Self { ptr, len: size }
    }
}

impl Drop for Blob {
    #[inline]
    fn drop(&mut self) {
        let &mut Blob { ptr, len } = self;
        unsafe { dealloc(ptr.as_ptr(), layout(len)) }
    }
}

// 零长度也分配一个单元，保证指针有效
#[inline(always)]
const fn layout(size: usize) -> Layout {
    let size = if size == 0 { 1 } else { size };
    unsafe { Layout::from_size_align_unchecked(size, std::mem::align_of::<u64>()) }
}

impl Deref for Blob {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        unsafe { from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for Blob {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

#[test]
fn test_blob() {
    let mut blob = Blob::new(24);
    assert_eq!(blob.len(), 24);
    assert!(blob.iter().all(|&b| b == 0));
    assert_eq!(blob.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
    blob[3] = 7;
    assert_eq!(blob[3], 7);
    assert!(Blob::new(0).is_empty());
}
