//! Owner resolution.
//!
//! Mapping a file to the principal that owns it is the most platform-specific
//! step of extraction, so it sits behind the [`OwnerResolver`] trait. One
//! implementation is chosen at startup by [`default_resolver`]:
//!
//! - [`PosixOwnerResolver`] maps the file's uid to an account name.
//! - `WindowsOwnerResolver` reads the owner SID from the security descriptor
//!   and formats it as `DOMAIN\account`.
//! - [`NoopOwnerResolver`] never resolves; used where neither applies or when
//!   owner lookup is disabled.
//!
//! Resolution failures are never fatal; the extractor records
//! [`UNKNOWN_OWNER`](fstimeline_core::UNKNOWN_OWNER) instead.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use fstimeline_core::ScanConfig;

/// Errors from owner lookup.
#[derive(Debug, Error)]
pub enum OwnerError {
    /// The platform or filesystem has no owner concept.
    #[error("owner lookup is not supported")]
    Unsupported,

    /// The owner identifier has no account behind it.
    #[error("no account found for {principal}")]
    UnknownPrincipal { principal: String },

    /// The platform lookup itself failed.
    #[error("owner lookup failed for {target}: {source}")]
    Lookup {
        target: String,
        #[source]
        source: io::Error,
    },
}

/// Resolves the principal that owns a file.
pub trait OwnerResolver: Send + Sync {
    /// Short name of this resolver, used in logs.
    fn name(&self) -> &'static str;

    /// Resolve the owner display name of `path`.
    ///
    /// `metadata` is the metadata the caller already read for `path`.
    fn resolve(&self, path: &Path, metadata: &Metadata) -> Result<String, OwnerError>;
}

/// Pick the resolver for the host platform.
pub fn default_resolver(config: &ScanConfig) -> Arc<dyn OwnerResolver> {
    if !config.resolve_owners {
        return Arc::new(NoopOwnerResolver);
    }
    platform_resolver()
}

#[cfg(unix)]
fn platform_resolver() -> Arc<dyn OwnerResolver> {
    Arc::new(PosixOwnerResolver::new())
}

#[cfg(windows)]
fn platform_resolver() -> Arc<dyn OwnerResolver> {
    Arc::new(WindowsOwnerResolver)
}

#[cfg(not(any(unix, windows)))]
fn platform_resolver() -> Arc<dyn OwnerResolver> {
    Arc::new(NoopOwnerResolver)
}

/// Resolver that never knows the owner.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOwnerResolver;

impl OwnerResolver for NoopOwnerResolver {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn resolve(&self, _path: &Path, _metadata: &Metadata) -> Result<String, OwnerError> {
        Err(OwnerError::Unsupported)
    }
}

#[cfg(unix)]
pub use posix::PosixOwnerResolver;

#[cfg(unix)]
mod posix {
    use std::ffi::CStr;
    use std::fs::Metadata;
    use std::io;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    use dashmap::DashMap;

    use super::{OwnerError, OwnerResolver};

    /// Upper bound for the `getpwuid_r` scratch buffer.
    const MAX_PASSWD_BUF: usize = 1 << 20;

    /// Maps uids to account names through the system user database.
    ///
    /// Lookups are cached per uid, including misses, since a tree is usually
    /// owned by a handful of accounts.
    #[derive(Debug, Default)]
    pub struct PosixOwnerResolver {
        cache: DashMap<u32, Option<String>>,
    }

    impl PosixOwnerResolver {
        /// Create a resolver with an empty cache.
        pub fn new() -> Self {
            Self::default()
        }

        /// Resolve a uid directly.
        pub fn resolve_uid(&self, uid: u32) -> Result<String, OwnerError> {
            let cached = self.cache.get(&uid).map(|entry| entry.value().clone());
            let name = match cached {
                Some(name) => name,
                None => {
                    let name = lookup_user_name(uid).map_err(|source| OwnerError::Lookup {
                        target: format!("uid {uid}"),
                        source,
                    })?;
                    self.cache.insert(uid, name.clone());
                    name
                }
            };
            name.ok_or_else(|| OwnerError::UnknownPrincipal {
                principal: format!("uid {uid}"),
            })
        }
    }

    impl OwnerResolver for PosixOwnerResolver {
        fn name(&self) -> &'static str {
            "posix"
        }

        fn resolve(&self, _path: &Path, metadata: &Metadata) -> Result<String, OwnerError> {
            self.resolve_uid(metadata.uid())
        }
    }

    fn lookup_user_name(uid: u32) -> io::Result<Option<String>> {
        // SAFETY: sysconf has no preconditions.
        let hint = unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) };
        let mut buf_len = if hint > 0 { hint as usize } else { 1024 };

        loop {
            let mut buf: Vec<libc::c_char> = vec![0; buf_len];
            // SAFETY: passwd is plain old data; getpwuid_r fills it in.
            let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::passwd = std::ptr::null_mut();

            // SAFETY: every pointer refers to a live local of the advertised size.
            let rc = unsafe {
                libc::getpwuid_r(
                    uid as libc::uid_t,
                    &mut pwd,
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };

            if rc == libc::ERANGE && buf_len < MAX_PASSWD_BUF {
                buf_len *= 2;
                continue;
            }
            // Some NSS backends report a missing entry as an error code.
            if matches!(rc, libc::ENOENT | libc::ESRCH | libc::EBADF | libc::EPERM) {
                return Ok(None);
            }
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            if result.is_null() || pwd.pw_name.is_null() {
                return Ok(None);
            }

            // SAFETY: on success pw_name points into `buf`, which is still alive.
            let name = unsafe { CStr::from_ptr(pwd.pw_name) };
            return Ok(Some(name.to_string_lossy().into_owned()));
        }
    }

}

#[cfg(windows)]
pub use windows_impl::WindowsOwnerResolver;

#[cfg(windows)]
mod windows_impl {
    use std::fs::Metadata;
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use windows::Win32::Foundation::{HLOCAL, LocalFree};
    use windows::Win32::Security::Authorization::{GetNamedSecurityInfoW, SE_FILE_OBJECT};
    use windows::Win32::Security::{
        LookupAccountSidW, OWNER_SECURITY_INFORMATION, PSECURITY_DESCRIPTOR, PSID, SID_NAME_USE,
    };
    use windows::core::{PCWSTR, PWSTR};

    use super::{OwnerError, OwnerResolver};

    /// Reads the owner SID from a file's security descriptor.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsOwnerResolver;

    impl OwnerResolver for WindowsOwnerResolver {
        fn name(&self) -> &'static str {
            "windows"
        }

        fn resolve(&self, path: &Path, _metadata: &Metadata) -> Result<String, OwnerError> {
            let lookup_err = |source| OwnerError::Lookup {
                target: path.display().to_string(),
                source,
            };

            let wide: Vec<u16> = path
                .as_os_str()
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();
            let mut owner = PSID::default();
            let mut descriptor = PSECURITY_DESCRIPTOR::default();

            // SAFETY: `wide` is NUL-terminated and outlives the call; the
            // descriptor is released below with LocalFree.
            let status = unsafe {
                GetNamedSecurityInfoW(
                    PCWSTR(wide.as_ptr()),
                    SE_FILE_OBJECT,
                    OWNER_SECURITY_INFORMATION,
                    Some(&mut owner),
                    None,
                    None,
                    None,
                    &mut descriptor,
                )
            };
            status.ok().map_err(|e| lookup_err(io::Error::other(e)))?;

            let result = account_name(owner).map_err(lookup_err);

            // SAFETY: the descriptor was allocated by GetNamedSecurityInfoW.
            unsafe {
                let _ = LocalFree(Some(HLOCAL(descriptor.0)));
            }
            result
        }
    }

    fn account_name(sid: PSID) -> io::Result<String> {
        let mut name_len = 0u32;
        let mut domain_len = 0u32;
        let mut sid_use = SID_NAME_USE::default();

        // First call only reports the buffer sizes.
        // SAFETY: null buffers with zero lengths are the documented size query.
        unsafe {
            let _ = LookupAccountSidW(
                PCWSTR::null(),
                sid,
                None,
                &mut name_len,
                None,
                &mut domain_len,
                &mut sid_use,
            );
        }
        if name_len == 0 {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unmapped SID"));
        }

        let mut name = vec![0u16; name_len as usize];
        let mut domain = vec![0u16; domain_len as usize];
        // SAFETY: buffers are sized from the query above.
        unsafe {
            LookupAccountSidW(
                PCWSTR::null(),
                sid,
                Some(PWSTR(name.as_mut_ptr())),
                &mut name_len,
                Some(PWSTR(domain.as_mut_ptr())),
                &mut domain_len,
                &mut sid_use,
            )
        }
        .map_err(io::Error::other)?;

        let name = String::from_utf16_lossy(&name[..name_len as usize]);
        let domain = String::from_utf16_lossy(&domain[..domain_len as usize]);
        Ok(if domain.is_empty() {
            name
        } else {
            format!("{domain}\\{name}")
        })
    }
}
