//! Pseudo-terminal window sizing

use std::io;
use std::os::unix::io::RawFd;

/// Set the window size of the terminal behind `fd` (`TIOCSWINSZ`)
///
/// Fails with the OS error when `fd` is not a terminal.
pub fn set_window_size(fd: RawFd, cols: u16, rows: u16) -> io::Result<()> {
    let winsize = libc::winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: TIOCSWINSZ only reads the winsize struct we pass by reference.
    let result = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &winsize) };
    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    tracing::debug!(fd, cols, rows, "pty window resized");
    Ok(())
}

/// Read the window size of the terminal behind `fd` (`TIOCGWINSZ`) as
/// `(cols, rows)`
#[cfg(test)]
pub(crate) fn window_size(fd: RawFd) -> io::Result<(u16, u16)> {
    let mut winsize = std::mem::MaybeUninit::<libc::winsize>::uninit();

    // SAFETY: on success TIOCGWINSZ fills the whole struct.
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, winsize.as_mut_ptr()) };
    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    let winsize = unsafe { winsize.assume_init() };
    Ok((winsize.ws_col, winsize.ws_row))
}
