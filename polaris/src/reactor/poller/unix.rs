use libc::{
    EFD_CLOEXEC, EFD_NONBLOCK, EINVAL, EPOLL_CLOEXEC, F_GETFD, F_SETFD, FD_CLOEXEC, close,
    epoll_create, epoll_create1, eventfd, fcntl, read, write,
};
use log::debug;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

/// Reads from a file descriptor into the given buffer.
///
/// Returns the number of bytes read, or a negative value on error.
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> isize {
    unsafe { read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) }
}

/// Writes the buffer to a file descriptor.
///
/// Returns the number of bytes written, or a negative value on error.
/// The file descriptor **must** be non-blocking.
pub(crate) fn sys_write(fd: RawFd, buffer: &[u8]) -> isize {
    unsafe { write(fd, buffer.as_ptr() as *const _, buffer.len()) }
}

/// Takes ownership of a freshly created descriptor.
///
/// # Safety
///
/// `fd` must be open and not owned by anything else.
unsafe fn owned(fd: RawFd) -> OwnedFd {
    unsafe { OwnedFd::from_raw_fd(fd) }
}

/// Marks `fd` close-on-exec, closing it if that fails.
///
/// A negative `fd` is treated as a failed creation and reported with the
/// current `errno`.
pub(crate) fn sys_set_cloexec_or_close(fd: RawFd) -> io::Result<OwnedFd> {
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 {
        let err = io::Error::last_os_error();
        unsafe { close(fd) };
        return Err(err);
    }

    let rc = unsafe { fcntl(fd, F_SETFD, flags | FD_CLOEXEC) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { close(fd) };
        return Err(err);
    }

    Ok(unsafe { owned(fd) })
}

/// Creates an `epoll` instance with close-on-exec set.
///
/// Kernels without `epoll_create1` reject it with `EINVAL`; those fall back
/// to `epoll_create` followed by a separate `FD_CLOEXEC` update.
pub(crate) fn sys_epoll_create_cloexec() -> io::Result<OwnedFd> {
    let fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
    if fd >= 0 {
        return Ok(unsafe { owned(fd) });
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(EINVAL) {
        return Err(err);
    }

    debug!("epoll_create1 unsupported, falling back to epoll_create");
    sys_set_cloexec_or_close(unsafe { epoll_create(1) })
}

/// Creates a non-blocking, close-on-exec `eventfd`.
pub(crate) fn sys_eventfd() -> io::Result<OwnedFd> {
    let fd = unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { owned(fd) })
}
