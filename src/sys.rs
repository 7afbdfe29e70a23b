//! Thin wrappers around the libc calls the daemons need: readiness
//! via `select(2)`, raw socket I/O, privilege handling and process
//! daemonization.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// A set of file descriptors for [`select`]. Rebuild it before every
/// call; the kernel overwrites the set in place.
pub struct FdSet {
    set: libc::fd_set,
    max_fd: RawFd,
}

impl FdSet {
    pub fn new() -> FdSet {
        let set = unsafe {
            let mut set = mem::MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(set.as_mut_ptr());
            set.assume_init()
        };
        FdSet { set, max_fd: -1 }
    }

    pub fn insert(&mut self, fd: RawFd) {
        unsafe { libc::FD_SET(fd, &mut self.set) };
        self.max_fd = self.max_fd.max(fd);
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        unsafe { libc::FD_ISSET(fd, &self.set) }
    }
}

impl Default for FdSet {
    fn default() -> FdSet {
        FdSet::new()
    }
}

/// Waits until a descriptor in `read` turns readable or the timeout
/// expires. Returns the number of ready descriptors; 0 means the
/// timeout ran out. `None` blocks indefinitely.
///
/// An `EINTR`/`EAGAIN` result is mapped to `Ok(0)`; callers rebuild
/// their sets each iteration anyway.
pub fn select(read: &mut FdSet, timeout: Option<Duration>) -> io::Result<usize> {
    let mut tv = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    let tv_ptr = match timeout {
        Some(duration) => {
            tv.tv_sec = duration.as_secs() as libc::time_t;
            tv.tv_usec = duration.subsec_micros() as libc::suseconds_t;
            &mut tv as *mut libc::timeval
        }
        None => std::ptr::null_mut(),
    };
    let rc = unsafe {
        libc::select(
            read.max_fd + 1,
            &mut read.set,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            tv_ptr,
        )
    };
    if rc < 0 {
        let error = io::Error::last_os_error();
        match error.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => Ok(0),
            _ => Err(error),
        }
    } else {
        Ok(rc as usize)
    }
}

/// Sends `buf` on a raw descriptor to an IPv4 destination.
pub fn send_to(fd: RawFd, buf: &[u8], addr: SocketAddrV4) -> io::Result<usize> {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr.s_addr = u32::from(*addr.ip()).to_be();

    let rc = unsafe {
        libc::sendto(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            0,
            &sin as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Receives a datagram from a raw descriptor, returning the payload
/// length and the source address.
pub fn recv_from(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut sin_len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    let rc = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            &mut sin as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut sin_len,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok((
            rc as usize,
            Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
        ))
    }
}

/// Puts a descriptor into non blocking mode so a slow reader cannot
/// stall the daemon.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Gives up root permissions for good.
pub fn drop_privileges() -> io::Result<()> {
    if unsafe { libc::setuid(libc::getuid()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Caps the CPU time of the process.
pub fn set_cpu_limit(seconds: u64) -> io::Result<()> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_CPU, &mut limit) } < 0 {
        return Err(io::Error::last_os_error());
    }
    limit.rlim_cur = seconds;
    if unsafe { libc::setrlimit(libc::RLIMIT_CPU, &limit) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Closes every descriptor in `lowest..FD_SETSIZE`. Leftover
/// descriptors inherited from the parent can dead lock the daemon
/// against itself once the parent goes away.
pub fn close_inherited_fds(lowest: RawFd) {
    for fd in lowest..libc::FD_SETSIZE as RawFd {
        unsafe { libc::close(fd) };
    }
}

/// Detaches from the controlling terminal: double fork with a
/// `setsid` in between. stdin and stdout are pointed at /dev/null;
/// stderr is kept for the log subscriber.
pub fn daemonize() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => return Err(io::Error::last_os_error()),
        0 => {}
        _ => std::process::exit(0),
    }
    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }
    match unsafe { libc::fork() } {
        -1 => return Err(io::Error::last_os_error()),
        0 => {}
        _ => std::process::exit(0),
    }
    let null = unsafe { libc::open(b"/dev/null\0".as_ptr() as *const libc::c_char, libc::O_RDWR) };
    if null >= 0 {
        unsafe {
            libc::dup2(null, 0);
            libc::dup2(null, 1);
            if null > 2 {
                libc::close(null);
            }
        }
    }
    Ok(())
}

/// Ignores SIGPIPE so a vanished subscriber surfaces as an `EPIPE`
/// write error instead of killing the process.
pub fn ignore_sigpipe() {
    unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
}
