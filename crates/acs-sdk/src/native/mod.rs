//! Native vendor library boundary
//!
//! This module provides the raw call surface of the vendor SDK:
//! - [`NativeSdk`]: the calls the gateway makes, one method per native symbol
//! - [`SdkLoader`]: how an implementation is obtained from the search directories
//! - a dynamic loader for the real library (feature `native-sdk`)
//! - [`MockSdk`]: an in-process simulation honouring the same structs and codes
//!
//! Methods mirror the native convention (boolean success, negative handles on
//! failure, error details through [`NativeSdk::last_error`]). Only the
//! [`crate::gateway::SdkGateway`] talks to this module.
//!
//! # Example
//!
//! ```ignore
//! use acs_sdk::native::create_loader;
//! use acs_sdk::AcsConfig;
//!
//! let loader = create_loader(&AcsConfig::default());
//! let loaded = loader.load(&search_dirs)?;
//! loaded.sdk.init();
//! ```

mod dynamic;
pub mod ffi;
pub mod mock;
pub mod paths;

pub use dynamic::DynamicLoader;
pub use ffi::{LoginOutcome, NextStatus, RawEvent, SearchedDevice};
pub use mock::{MockCall, MockDeviceSpec, MockLoader, MockSdk};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AcsConfig, SdkBackend};
use crate::error::SdkResult;
use ffi::{AcsEventCond, AcsEventRecord, DeviceInfoV40, LocalSdkPath, SadpDeviceList, UserLoginInfo};

/// Raw vendor SDK call surface
///
/// Implementations must be callable from several threads at once; the
/// gateway serialises `set_component_path`, `init` and `cleanup` itself.
pub trait NativeSdk: Send + Sync {
    /// Tell the library where its component libraries live
    fn set_component_path(&self, path: &LocalSdkPath) -> bool;

    fn init(&self) -> bool;

    fn cleanup(&self) -> bool;

    /// Error code of the most recent failed call
    fn last_error(&self) -> u32;

    /// Returns the session handle, negative on failure
    fn login(&self, info: &UserLoginInfo, device: &mut DeviceInfoV40) -> i32;

    fn logout(&self, user_id: i32) -> bool;

    /// Returns the stream handle, negative on failure
    fn start_remote_config(&self, user_id: i32, command: u32, cond: &AcsEventCond) -> i32;

    /// Returns one of the `NET_SDK_GET_NEXT_STATUS_*` codes
    fn get_next_remote_config(&self, handle: i32, record: &mut AcsEventRecord) -> i32;

    fn stop_remote_config(&self, handle: i32) -> bool;

    /// Broadcast search for devices on the session's segment
    fn search_devices(&self, user_id: i32, list: &mut SadpDeviceList) -> bool;
}

/// A loaded native implementation
pub struct LoadedSdk {
    pub sdk: Arc<dyn NativeSdk>,
    /// File the library was loaded from, `None` for in-process implementations
    pub location: Option<PathBuf>,
}

/// Obtains a [`NativeSdk`] from the resolved search directories
pub trait SdkLoader: Send + Sync {
    fn load(&self, search_dirs: &[PathBuf]) -> SdkResult<LoadedSdk>;
}

/// Create the loader selected by configuration
pub fn create_loader(config: &AcsConfig) -> Arc<dyn SdkLoader> {
    match config.sdk.backend {
        SdkBackend::Native => Arc::new(DynamicLoader::new(config.sdk.library_name.clone())),
        SdkBackend::Mock => {
            let sdk = MockSdk::from_config(&config.sdk.mock, &config.credentials);
            Arc::new(MockLoader::new(Arc::new(sdk)))
        }
    }
}
