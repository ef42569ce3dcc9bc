use std::sync::atomic::compiler_fence;
use std::sync::atomic::fence;
use std::sync::atomic::Ordering;

/// Full memory barrier between CPU accesses and device-visible accesses.
///
/// A sequentially consistent fence lowers to `dmb ish` on armv7 and aarch64
/// and to `mfence` on x86. The compiler fences keep volatile register
/// accesses from being moved across it.
#[inline(always)]
pub fn dmb() {
    compiler_fence(Ordering::SeqCst);
    fence(Ordering::SeqCst);
    compiler_fence(Ordering::SeqCst);
}
