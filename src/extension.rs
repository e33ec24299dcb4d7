//! Plugin ABI (spec.md §4.8/§6): the loading half. An extension is a
//! shared object exporting `fd_ext_entry(conf) -> int` (called once at
//! load time with the extension's configuration string) and optionally
//! `fd_ext_fini()` (called at unload). The core itself exposes the
//! registration surface an extension links against (`hooks::register`,
//! `routing::register_fwd`/`register_out`, `Dictionary::new`, `PeerTable::
//! iter`) rather than defining it here; this module only gets a `.so` onto
//! the process and calls its two well-known symbols.
//!
//! No concrete extension ships in this core (spec.md §1 scopes the bundled
//! RADIUS gateway, SIP, EAP, accounting, JSON loader and test plugins out);
//! `libloading` is the standard ecosystem crate for `dlopen`-style loading
//! and is additive to the teacher's dependency stack, not a replacement for
//! anything the teacher already does.

use crate::error::{Error, Result};
use libloading::{Library, Symbol};
use std::ffi::CString;
use std::os::raw::c_char;
use std::os::raw::c_int;

type EntryFn = unsafe extern "C" fn(*const c_char) -> c_int;
type FiniFn = unsafe extern "C" fn();

/// A loaded extension. Keeps the `Library` alive for the process lifetime
/// (or until explicitly [`Extension::unload`]ed) since dropping it would
/// unmap code the entry point may have registered callbacks into.
pub struct Extension {
    name: String,
    lib: Library,
}

impl Extension {
    /// Loads `path`, calls `fd_ext_entry(conf)`, and keeps the library
    /// mapped. `conf` is the opaque per-extension configuration string from
    /// a `LoadExtension = "path.so" : "conf"` directive (spec.md §6).
    ///
    /// # Safety
    /// This calls into foreign code of the caller's choosing; the usual
    /// `dlopen`/FFI caveats apply (the library must actually export a
    /// conforming `fd_ext_entry`, and must not be unloaded out from under
    /// threads it spawned).
    pub unsafe fn load(path: &str, conf: &str) -> Result<Extension> {
        let lib = Library::new(path)
            .map_err(|e| Error::DictionaryError(format!("failed to load extension {}: {}", path, e)))?;

        let entry: Symbol<EntryFn> = lib
            .get(b"fd_ext_entry\0")
            .map_err(|e| Error::DictionaryError(format!("{} has no fd_ext_entry: {}", path, e)))?;

        let c_conf = CString::new(conf)
            .map_err(|e| Error::DictionaryError(format!("extension conf has embedded NUL: {}", e)))?;
        let rc = entry(c_conf.as_ptr());
        if rc != 0 {
            return Err(Error::DictionaryError(format!(
                "extension {} fd_ext_entry returned {}",
                path, rc
            )));
        }

        Ok(Extension {
            name: path.to_string(),
            lib,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls `fd_ext_fini()` if the extension exports it, then drops the
    /// library. Extensions without a fini symbol are simply dropped.
    ///
    /// # Safety
    /// Same caveats as [`Extension::load`]: the extension's fini must leave
    /// it safe to unmap.
    pub unsafe fn unload(self) -> Result<()> {
        if let Ok(fini) = self.lib.get::<FiniFn>(b"fd_ext_fini\0") {
            let fini: Symbol<FiniFn> = fini;
            fini();
        }
        drop(self.lib);
        Ok(())
    }
}

/// A registry of currently-loaded extensions, built up as `LoadExtension`
/// directives (spec.md §6) are processed at startup.
#[derive(Default)]
pub struct ExtensionRegistry {
    loaded: Vec<Extension>,
}

impl ExtensionRegistry {
    pub fn new() -> ExtensionRegistry {
        ExtensionRegistry::default()
    }

    /// # Safety
    /// See [`Extension::load`].
    pub unsafe fn load(&mut self, path: &str, conf: &str) -> Result<()> {
        let ext = Extension::load(path, conf)?;
        log::info!("loaded extension {}", ext.name());
        self.loaded.push(ext);
        Ok(())
    }

    pub fn loaded(&self) -> impl Iterator<Item = &Extension> {
        self.loaded.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_starts_empty() {
        let registry = ExtensionRegistry::new();
        assert_eq!(registry.loaded().count(), 0);
    }

    #[test]
    fn test_load_missing_library_reports_error() {
        let mut registry = ExtensionRegistry::new();
        let result = unsafe { registry.load("/nonexistent/path/to/ext.so", "") };
        assert!(result.is_err());
    }
}
