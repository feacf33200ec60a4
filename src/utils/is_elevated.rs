//! Whether the current process has the permissions `service::install`/
//! `uninstall` need (root on POSIX, an elevated token on Windows).

#[cfg(target_family = "windows")]
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
#[cfg(target_family = "windows")]
use windows_sys::Win32::Security::{
    GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
};
#[cfg(target_family = "windows")]
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct IsElevatedError(String);

pub fn is_elevated() -> Result<bool, IsElevatedError> {
    #[cfg(target_family = "unix")]
    return Ok(nix::unistd::Uid::effective().is_root());

    #[cfg(target_family = "windows")]
    is_elevated_windows()
}

#[cfg(target_family = "windows")]
fn is_elevated_windows() -> Result<bool, IsElevatedError> {
    unsafe {
        let mut token_handle: HANDLE = 0;
        let process = GetCurrentProcess();

        if OpenProcessToken(process, TOKEN_QUERY, &mut token_handle) == 0 {
            return Err(IsElevatedError("failed to open process token".to_string()));
        }

        let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
        let mut return_length = 0;

        let result = GetTokenInformation(
            token_handle,
            TokenElevation,
            &mut elevation as *mut _ as *mut _,
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut return_length,
        );

        CloseHandle(token_handle);

        if result == 0 {
            return Err(IsElevatedError(
                "failed to read token elevation information".to_string(),
            ));
        }

        Ok(elevation.TokenIsElevated != 0)
    }
}
