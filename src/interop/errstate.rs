//! Last-error state: capture after a native call and where it is kept
//!
//! `capture` must run right after the foreign routine returns, before any
//! allocation or other call that could overwrite `errno`.

use std::cell::Cell;

use parking_lot::Mutex;

/// System error codes observed right after a native call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct LastError {
    /// C `errno`
    pub errno: i32,
    /// `GetLastError()` on platforms with a separate OS channel
    pub os_error: Option<u32>,
}

impl LastError {
    pub const NONE: Self = Self {
        errno: 0,
        os_error: None,
    };

    pub fn is_set(&self) -> bool {
        self.errno != 0 || self.os_error.map_or(false, |e| e != 0)
    }
}

#[cfg(windows)]
extern "C" {
    fn _errno() -> *mut core::ffi::c_int;
}

/// Read the calling thread's last-error state
#[cfg(unix)]
#[inline(always)]
pub(crate) fn capture() -> LastError {
    LastError {
        errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        os_error: None,
    }
}

#[cfg(windows)]
#[inline(always)]
pub(crate) fn capture() -> LastError {
    let errno = unsafe { *_errno() };
    let os_error = unsafe { winapi::um::errhandlingapi::GetLastError() };
    LastError {
        errno,
        os_error: Some(os_error),
    }
}

#[cfg(not(any(unix, windows)))]
#[inline(always)]
pub(crate) fn capture() -> LastError {
    LastError::NONE
}

/// Destination for captured error state
pub trait ErrorSink {
    fn record(&self, error: LastError);
}

/// Error slot owned by one function value
///
/// Concurrent callers of the same function overwrite each other; the last
/// writer wins. Use `thread_last_error` for per-call attribution.
#[derive(Debug, Default)]
pub struct ErrorState {
    slot: Mutex<LastError>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> LastError {
        *self.slot.lock()
    }

    pub fn errno(&self) -> i32 {
        self.slot.lock().errno
    }

    pub fn os_error(&self) -> Option<u32> {
        self.slot.lock().os_error
    }

    pub fn clear(&self) {
        *self.slot.lock() = LastError::NONE;
    }
}

impl ErrorSink for ErrorState {
    fn record(&self, error: LastError) {
        *self.slot.lock() = error;
    }
}

thread_local! {
    static THREAD_LAST_ERROR: Cell<LastError> = const { Cell::new(LastError::NONE) };
}

/// Error state of the most recent call made on this thread
pub fn thread_last_error() -> LastError {
    THREAD_LAST_ERROR.with(Cell::get)
}

pub fn record_thread_last_error(error: LastError) {
    THREAD_LAST_ERROR.with(|cell| cell.set(error));
}

/// Sink that writes to the calling thread's channel
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSink;

impl ErrorSink for ThreadSink {
    fn record(&self, error: LastError) {
        record_thread_last_error(error);
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for &S {
    fn record(&self, error: LastError) {
        (**self).record(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_state_last_writer_wins() {
        let state = ErrorState::new();
        state.record(LastError { errno: 2, os_error: None });
        state.record(LastError { errno: 22, os_error: None });
        assert_eq!(state.errno(), 22);
        state.clear();
        assert!(!state.get().is_set());
    }

    #[test]
    fn test_thread_channel_is_per_thread() {
        record_thread_last_error(LastError { errno: 9, os_error: None });
        let other = std::thread::spawn(thread_last_error).join().unwrap();
        assert_eq!(other, LastError::NONE);
        assert_eq!(thread_last_error().errno, 9);
        ThreadSink.record(LastError::NONE);
        assert_eq!(thread_last_error(), LastError::NONE);
    }
}
