//! Runtime loading of the vendor library
//!
//! With the `native-sdk` feature the library is opened with `libloading` from
//! the first search directory that contains it. Without the feature the loader
//! always fails, and that failure surfaces through health like any other
//! initialization error.

use std::path::PathBuf;

use super::paths;
use super::{LoadedSdk, SdkLoader};
use crate::codes::LIBRARY_LOAD_FAILED;
use crate::error::{SdkError, SdkResult};

/// Loader for the real vendor library
pub struct DynamicLoader {
    library_name: String,
}

impl DynamicLoader {
    pub fn new(library_name: Option<String>) -> Self {
        Self {
            library_name: library_name
                .unwrap_or_else(|| paths::default_library_name().to_string()),
        }
    }

    pub fn library_name(&self) -> &str {
        &self.library_name
    }
}

#[cfg(not(feature = "native-sdk"))]
impl SdkLoader for DynamicLoader {
    fn load(&self, _search_dirs: &[PathBuf]) -> SdkResult<LoadedSdk> {
        Err(SdkError::initialization_with(
            LIBRARY_LOAD_FAILED,
            format!(
                "{} cannot be loaded: built without the 'native-sdk' feature",
                self.library_name
            ),
        ))
    }
}

#[cfg(feature = "native-sdk")]
impl SdkLoader for DynamicLoader {
    fn load(&self, search_dirs: &[PathBuf]) -> SdkResult<LoadedSdk> {
        let Some(location) = paths::locate_library(search_dirs, &self.library_name) else {
            return Err(SdkError::initialization_with(
                LIBRARY_LOAD_FAILED,
                format!(
                    "{} not found in {} search directories",
                    self.library_name,
                    search_dirs.len()
                ),
            ));
        };

        let sdk = imp::DynamicSdk::open(&location).map_err(|e| {
            SdkError::initialization_with(
                LIBRARY_LOAD_FAILED,
                format!("failed to load {}: {}", location.display(), e),
            )
        })?;

        tracing::info!(path = %location.display(), "Loaded native SDK library");
        Ok(LoadedSdk {
            sdk: std::sync::Arc::new(sdk),
            location: Some(location),
        })
    }
}

#[cfg(feature = "native-sdk")]
mod imp {
    use std::ffi::c_void;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    use libloading::Library;

    use crate::codes::SdkErrorCode;
    use crate::native::ffi::{
        AcsEventCond, AcsEventRecord, DeviceInfoV40, LocalSdkPath, SadpDeviceList, UserLoginInfo,
        NET_SDK_INIT_CFG_SDK_PATH,
    };
    use crate::native::NativeSdk;

    type Bool = i32;

    type InitFn = unsafe extern "system" fn() -> Bool;
    type CleanupFn = unsafe extern "system" fn() -> Bool;
    type GetLastErrorFn = unsafe extern "system" fn() -> u32;
    type SetInitCfgFn = unsafe extern "system" fn(i32, *const c_void) -> Bool;
    type LoginFn = unsafe extern "system" fn(*const UserLoginInfo, *mut DeviceInfoV40) -> i32;
    type LogoutFn = unsafe extern "system" fn(i32) -> Bool;
    type StartRemoteConfigFn = unsafe extern "system" fn(
        i32,
        u32,
        *const c_void,
        u32,
        Option<unsafe extern "system" fn(u32, *mut c_void, u32, *mut c_void)>,
        *mut c_void,
    ) -> i32;
    type GetNextRemoteConfigFn = unsafe extern "system" fn(i32, *mut c_void, u32) -> i32;
    type StopRemoteConfigFn = unsafe extern "system" fn(i32) -> Bool;
    type SearchDevicesFn = unsafe extern "system" fn(i32, *mut SadpDeviceList) -> Bool;

    /// Function table resolved from the vendor library
    pub struct DynamicSdk {
        init: InitFn,
        cleanup: CleanupFn,
        get_last_error: GetLastErrorFn,
        set_init_cfg: SetInitCfgFn,
        login: LoginFn,
        logout: LogoutFn,
        start_remote_config: StartRemoteConfigFn,
        get_next_remote_config: GetNextRemoteConfigFn,
        stop_remote_config: StopRemoteConfigFn,
        /// Not every build exports device search
        search_devices: Option<SearchDevicesFn>,
        /// Error raised on this side of the boundary, reported before the native one
        local_error: AtomicU32,
        // Must outlive every function pointer above
        _library: Library,
    }

    impl DynamicSdk {
        pub fn open(path: &Path) -> Result<Self, libloading::Error> {
            // SAFETY: loading the vendor library runs its initialisers, which
            // have no preconditions on our side.
            let library = unsafe { Library::new(path)? };

            // SAFETY: each symbol is declared with the vendor's documented
            // signature; pointers are copied out while `library` stays alive
            // in the same struct.
            unsafe {
                let init = *library.get::<InitFn>(b"NET_DVR_Init\0")?;
                let cleanup = *library.get::<CleanupFn>(b"NET_DVR_Cleanup\0")?;
                let get_last_error = *library.get::<GetLastErrorFn>(b"NET_DVR_GetLastError\0")?;
                let set_init_cfg = *library.get::<SetInitCfgFn>(b"NET_DVR_SetSDKInitCfg\0")?;
                let login = *library.get::<LoginFn>(b"NET_DVR_Login_V40\0")?;
                let logout = *library.get::<LogoutFn>(b"NET_DVR_Logout\0")?;
                let start_remote_config =
                    *library.get::<StartRemoteConfigFn>(b"NET_DVR_StartRemoteConfig\0")?;
                let get_next_remote_config =
                    *library.get::<GetNextRemoteConfigFn>(b"NET_DVR_GetNextRemoteConfig\0")?;
                let stop_remote_config =
                    *library.get::<StopRemoteConfigFn>(b"NET_DVR_StopRemoteConfig\0")?;
                let search_devices = library
                    .get::<SearchDevicesFn>(b"NET_DVR_SearchOnlineDevices\0")
                    .ok()
                    .map(|s| *s);

                Ok(Self {
                    init,
                    cleanup,
                    get_last_error,
                    set_init_cfg,
                    login,
                    logout,
                    start_remote_config,
                    get_next_remote_config,
                    stop_remote_config,
                    search_devices,
                    local_error: AtomicU32::new(0),
                    _library: library,
                })
            }
        }
    }

    impl NativeSdk for DynamicSdk {
        fn set_component_path(&self, path: &LocalSdkPath) -> bool {
            // SAFETY: `path` is a valid NET_DVR_LOCAL_SDK_PATH for the duration of the call
            unsafe {
                (self.set_init_cfg)(
                    NET_SDK_INIT_CFG_SDK_PATH,
                    (path as *const LocalSdkPath).cast(),
                ) != 0
            }
        }

        fn init(&self) -> bool {
            // SAFETY: no arguments
            unsafe { (self.init)() != 0 }
        }

        fn cleanup(&self) -> bool {
            // SAFETY: no arguments
            unsafe { (self.cleanup)() != 0 }
        }

        fn last_error(&self) -> u32 {
            match self.local_error.swap(0, Ordering::SeqCst) {
                // SAFETY: no arguments
                0 => unsafe { (self.get_last_error)() },
                code => code,
            }
        }

        fn login(&self, info: &UserLoginInfo, device: &mut DeviceInfoV40) -> i32 {
            // SAFETY: both pointers reference live, correctly laid out structs
            unsafe { (self.login)(info, device) }
        }

        fn logout(&self, user_id: i32) -> bool {
            // SAFETY: plain integer handle
            unsafe { (self.logout)(user_id) != 0 }
        }

        fn start_remote_config(&self, user_id: i32, command: u32, cond: &AcsEventCond) -> i32 {
            // SAFETY: `cond` outlives the call; no callback is registered
            unsafe {
                (self.start_remote_config)(
                    user_id,
                    command,
                    (cond as *const AcsEventCond).cast(),
                    cond.size,
                    None,
                    std::ptr::null_mut(),
                )
            }
        }

        fn get_next_remote_config(&self, handle: i32, record: &mut AcsEventRecord) -> i32 {
            let size = record.size;
            // SAFETY: `record` is a writable buffer of exactly `size` bytes
            unsafe {
                (self.get_next_remote_config)(handle, (record as *mut AcsEventRecord).cast(), size)
            }
        }

        fn stop_remote_config(&self, handle: i32) -> bool {
            // SAFETY: plain integer handle
            unsafe { (self.stop_remote_config)(handle) != 0 }
        }

        fn search_devices(&self, user_id: i32, list: &mut SadpDeviceList) -> bool {
            match self.search_devices {
                // SAFETY: `list` is a writable, correctly sized output buffer
                Some(search) => unsafe { search(user_id, list) != 0 },
                None => {
                    self.local_error
                        .store(SdkErrorCode::NotSupported.into(), Ordering::SeqCst);
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_library_name() {
        let loader = DynamicLoader::new(None);
        assert_eq!(loader.library_name(), paths::default_library_name());

        let loader = DynamicLoader::new(Some("libcustom.so".into()));
        assert_eq!(loader.library_name(), "libcustom.so");
    }

    #[test]
    fn test_missing_library_is_initialization_error() {
        let loader = DynamicLoader::new(None);
        let result = loader.load(&[PathBuf::from("/definitely/not/here")]);
        let Err(SdkError::Initialization(diag)) = result else {
            panic!("expected initialization error");
        };
        assert_eq!(diag.code, LIBRARY_LOAD_FAILED);
    }
}
