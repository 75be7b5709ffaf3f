//! Dynamic library loading and symbol resolution
//!
//! Platform-agnostic wrapper around dlopen/LoadLibrary. Resolved symbols
//! are plain addresses, ready to hand to `Function::new`.
//!
//! Dropping a `Library` leaves the library loaded unless closing was
//! enabled with [`Library::enable_close`], so addresses resolved through it
//! stay callable. [`Library::close`] always releases the handle.

use core::ffi::{c_int, c_void};
use core::ops::{BitOr, BitOrAssign};
use std::ffi::CString;

use crate::logging::{debug, log_library_open};

/// `dlopen` mode bits. Ignored by `LoadLibrary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFlags(c_int);

#[cfg(unix)]
impl OpenFlags {
    pub const LAZY: Self = Self(libc::RTLD_LAZY);
    pub const NOW: Self = Self(libc::RTLD_NOW);
    pub const GLOBAL: Self = Self(libc::RTLD_GLOBAL);
    pub const LOCAL: Self = Self(libc::RTLD_LOCAL);
}

#[cfg(not(unix))]
impl OpenFlags {
    pub const LAZY: Self = Self(0);
    pub const NOW: Self = Self(0);
    pub const GLOBAL: Self = Self(0);
    pub const LOCAL: Self = Self(0);
}

impl OpenFlags {
    /// Mode used by [`Library::open`]
    pub const DEFAULT: Self = Self(Self::LAZY.0 | Self::GLOBAL.0);

    #[inline]
    pub const fn from_bits(bits: c_int) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> c_int {
        self.0
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// What the raw handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    /// Reference counted by the loader; released by dlclose/FreeLibrary
    Loaded,
    /// Search-scope marker (`RTLD_DEFAULT`, `RTLD_NEXT`) or an unowned module
    Pseudo,
}

/// Handle to a dynamically loaded library
pub struct Library {
    /// May be null or otherwise invalid as a pointer for pseudo-handles
    handle: *mut c_void,
    name: String,
    kind: HandleKind,
    closed: bool,
    close_on_drop: bool,
}

impl Library {
    /// Load library by name or path with [`OpenFlags::DEFAULT`]
    pub fn open(name: &str) -> Result<Self, LoadError> {
        Self::open_with_flags(name, OpenFlags::DEFAULT)
    }

    /// Load library by name or path with explicit `dlopen` mode bits
    pub fn open_with_flags(name: &str, flags: OpenFlags) -> Result<Self, LoadError> {
        let handle = Self::open_impl(name, flags)?;
        log_library_open(name);
        Ok(Self::new(handle, name, HandleKind::Loaded))
    }

    /// The running program's own image, including everything it links
    pub fn this() -> Result<Self, LoadError> {
        Self::this_impl()
    }

    /// Search the global scope in default load order (`RTLD_DEFAULT`)
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    pub fn default_scope() -> Self {
        Self::new(libc::RTLD_DEFAULT, "<default>", HandleKind::Pseudo)
    }

    /// Search the objects loaded after the caller's (`RTLD_NEXT`)
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    pub fn next() -> Self {
        Self::new(libc::RTLD_NEXT, "<next>", HandleKind::Pseudo)
    }

    fn new(handle: *mut c_void, name: &str, kind: HandleKind) -> Self {
        Self {
            handle,
            name: name.to_string(),
            kind,
            closed: false,
            close_on_drop: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self.handle
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the handle on drop
    pub fn enable_close(&mut self) {
        self.close_on_drop = true;
    }

    /// Keep the library loaded when this value is dropped
    pub fn disable_close(&mut self) {
        self.close_on_drop = false;
    }

    pub fn close_enabled(&self) -> bool {
        self.close_on_drop
    }

    /// Release the handle now. Symbols can no longer be resolved through it.
    ///
    /// Addresses resolved earlier become dangling once the loader unloads the
    /// library.
    pub fn close(&mut self) -> Result<(), LoadError> {
        if self.closed {
            return Err(LoadError::Closed);
        }
        self.closed = true;
        if self.kind == HandleKind::Pseudo {
            return Ok(());
        }
        debug!(library = %self.name, "closing library");
        self.close_impl()
    }

    #[cfg(unix)]
    fn open_impl(name: &str, flags: OpenFlags) -> Result<*mut c_void, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;
        let handle = unsafe { libc::dlopen(cname.as_ptr(), flags.bits()) };
        if handle.is_null() {
            Err(LoadError::LoadFailed(dl_error()))
        } else {
            Ok(handle)
        }
    }

    #[cfg(unix)]
    fn this_impl() -> Result<Self, LoadError> {
        let handle = unsafe { libc::dlopen(core::ptr::null(), libc::RTLD_NOW) };
        if handle.is_null() {
            return Err(LoadError::LoadFailed(dl_error()));
        }
        Ok(Self::new(handle, "<self>", HandleKind::Loaded))
    }

    #[cfg(unix)]
    fn close_impl(&self) -> Result<(), LoadError> {
        if unsafe { libc::dlclose(self.handle) } == 0 {
            Ok(())
        } else {
            Err(LoadError::CloseFailed(dl_error()))
        }
    }

    #[cfg(windows)]
    fn open_impl(name: &str, _flags: OpenFlags) -> Result<*mut c_void, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::LoadLibraryW;

        if name.contains('\0') {
            return Err(LoadError::InvalidName);
        }
        let wide: Vec<u16> = OsStr::new(name).encode_wide().chain(Some(0)).collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr()) as *mut c_void;
            if handle.is_null() {
                Err(LoadError::LoadFailed(format!("Error code: {}", GetLastError())))
            } else {
                Ok(handle)
            }
        }
    }

    #[cfg(windows)]
    fn this_impl() -> Result<Self, LoadError> {
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::GetModuleHandleW;

        // GetModuleHandle does not add a reference
        let handle = unsafe { GetModuleHandleW(core::ptr::null()) } as *mut c_void;
        if handle.is_null() {
            let code = unsafe { GetLastError() };
            return Err(LoadError::LoadFailed(format!("Error code: {}", code)));
        }
        Ok(Self::new(handle, "<self>", HandleKind::Pseudo))
    }

    #[cfg(windows)]
    fn close_impl(&self) -> Result<(), LoadError> {
        use winapi::shared::minwindef::HMODULE;
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::FreeLibrary;

        unsafe {
            if FreeLibrary(self.handle as HMODULE) != 0 {
                Ok(())
            } else {
                Err(LoadError::CloseFailed(format!("Error code: {}", GetLastError())))
            }
        }
    }

    /// Resolve a symbol to its address
    pub fn symbol(&self, name: &str) -> Result<usize, SymbolError> {
        if self.closed {
            return Err(SymbolError::Closed);
        }
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;
        let addr = self.symbol_impl(&cname);
        if addr.is_null() {
            return Err(SymbolError::NotFound(name.to_string()));
        }
        debug!(library = %self.name, symbol = name, address = ?addr, "symbol resolved");
        Ok(addr as usize)
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &CString) -> *mut c_void {
        unsafe { libc::dlsym(self.handle, name.as_ptr()) }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &CString) -> *mut c_void {
        use winapi::shared::minwindef::HMODULE;
        use winapi::um::libloaderapi::GetProcAddress;

        unsafe { GetProcAddress(self.handle as HMODULE, name.as_ptr()) as *mut c_void }
    }
}

#[cfg(unix)]
fn dl_error() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "Unknown error".into()
    } else {
        unsafe { std::ffi::CStr::from_ptr(err) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if self.close_on_drop && !self.closed {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("closed", &self.closed)
            .field("close_on_drop", &self.close_on_drop)
            .finish()
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

/// Library loading errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    InvalidName,
    LoadFailed(String),
    /// The handle was already closed
    Closed,
    CloseFailed(String),
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid library name"),
            Self::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
            Self::Closed => write!(f, "closed handle"),
            Self::CloseFailed(msg) => write!(f, "Failed to close library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// Symbol lookup errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    InvalidName,
    NotFound(String),
    /// Lookup through a closed handle
    Closed,
}

impl core::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid symbol name"),
            Self::NotFound(name) => write!(f, "unknown symbol \"{}\"", name),
            Self::Closed => write!(f, "closed handle"),
        }
    }
}

impl std::error::Error for SymbolError {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    const LIBC_SO: &str = "libc.so.6";
    #[cfg(target_os = "macos")]
    const LIBC_SO: &str = "/usr/lib/libSystem.B.dylib";

    #[test]
    fn test_resolve_from_self() {
        let lib = Library::this().unwrap();
        assert!(lib.symbol("malloc").unwrap() != 0);
        assert_eq!(lib.name(), "<self>");
    }

    #[test]
    fn test_unknown_symbol() {
        let lib = Library::this().unwrap();
        assert_eq!(
            lib.symbol("fooo_no_such_symbol"),
            Err(SymbolError::NotFound("fooo_no_such_symbol".into()))
        );
        assert_eq!(lib.symbol("bad\0name"), Err(SymbolError::InvalidName));
    }

    #[test]
    fn test_missing_library() {
        let err = Library::open("libdlcall-does-not-exist.so").unwrap_err();
        assert!(matches!(err, LoadError::LoadFailed(_)));
        assert_eq!(Library::open("a\0b").unwrap_err(), LoadError::InvalidName);
    }

    #[test]
    fn test_close_then_close_again() {
        let mut lib = Library::this().unwrap();
        assert_eq!(lib.close(), Ok(()));
        assert!(lib.is_closed());
        assert_eq!(lib.close(), Err(LoadError::Closed));
    }

    #[test]
    fn test_symbol_after_close() {
        let mut lib = Library::this().unwrap();
        lib.close().unwrap();
        assert_eq!(lib.symbol("calloc"), Err(SymbolError::Closed));
        assert_eq!(lib.symbol("fooo"), Err(SymbolError::Closed));
    }

    #[test]
    fn test_close_on_drop_toggle() {
        let mut lib = Library::this().unwrap();
        assert!(!lib.close_enabled());

        lib.enable_close();
        assert!(lib.close_enabled());
        lib.disable_close();
        assert!(!lib.close_enabled());

        // dropping with close enabled releases the reference
        lib.enable_close();
        drop(lib);
    }

    #[test]
    fn test_default_flags() {
        assert_eq!(OpenFlags::default(), OpenFlags::LAZY | OpenFlags::GLOBAL);
        let mut flags = OpenFlags::NOW;
        flags |= OpenFlags::LOCAL;
        assert_eq!(flags.bits(), libc::RTLD_NOW | libc::RTLD_LOCAL);
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_open_with_flags() {
        let mut lib = Library::open_with_flags(LIBC_SO, OpenFlags::LAZY | OpenFlags::GLOBAL).unwrap();
        assert!(lib.symbol("calloc").unwrap() != 0);
        assert_eq!(lib.close(), Ok(()));
    }

    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    #[test]
    fn test_pseudo_handles() {
        let default = Library::default_scope();
        assert!(default.symbol("malloc").unwrap() != 0);

        let next = Library::next();
        assert!(next.symbol("malloc").unwrap() != 0);

        // closing a search scope only marks the value closed
        let mut default = Library::default_scope();
        assert_eq!(default.close(), Ok(()));
        assert_eq!(default.symbol("malloc"), Err(SymbolError::Closed));
    }
}
