use anyhow::Result;
use libc::{getpwuid, uid_t};
use std::ffi::CStr;

/// Person id used when none is given: the invoking user behind sudo, else
/// the effective user's login name.
pub fn default_person_id() -> Result<String> {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return Ok(user);
        }
    }
    effective_user_name()
}

pub fn effective_user_name() -> Result<String> {
    unsafe {
        let uid = libc::geteuid();
        let pwd = getpwuid(uid as uid_t);
        if pwd.is_null() {
            return Err(anyhow::anyhow!("failed to resolve current user (uid {uid})"));
        }
        let name = CStr::from_ptr((*pwd).pw_name);
        Ok(name.to_string_lossy().into_owned())
    }
}
