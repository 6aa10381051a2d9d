use std::fmt;

use serde::Serialize;

/// Build metadata exported by a binary's build script.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub repo_version: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) profile={} features={} built={} rustc={}",
            self.version,
            self.repo_version,
            self.build_profile,
            self.build_features,
            self.build_timestamp,
            self.rust_version,
        )
    }
}

/// Collects [`BuildInfo`] from the calling crate's compile-time environment.
///
/// This is a macro so the `env!` lookups happen in the crate whose build
/// script set them. Variables the build script didn't set read as
/// `"unknown"`.
#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo {
            version: env!("CARGO_PKG_VERSION"),
            build_profile: option_env!("BUILD_PROFILE").unwrap_or("unknown"),
            build_features: option_env!("BUILD_FEATURES").unwrap_or("unknown"),
            build_timestamp: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            rust_version: option_env!("RUST_VERSION").unwrap_or("unknown"),
            repo_version: option_env!("REPO_VERSION").unwrap_or("unknown"),
        }
    };
}

#[cfg(test)]
mod test {
    #[test]
    fn test_build_info_without_build_script() {
        let info = crate::build_info!();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.build_profile, "unknown");
        assert!(info.to_string().starts_with(info.version));
    }
}
