//! CLI configuration: thin wrapper around `devgrid_config` shared types.
//!
//! Adds CLI-specific resolution that respects `GlobalOpts` flag overrides
//! (--server, --token, --insecure, timeouts, body encoding).

use std::time::Duration;

use secrecy::SecretString;

use devgrid_core::{BodyEncoding, ControllerConfig, TlsVerification};

use crate::cli::{BodyEncodingArg, GlobalOpts};
use crate::error::CliError;

pub use devgrid_config::{
    Config, Profile, config_path, load_config_or_default, save_config,
};

impl From<BodyEncodingArg> for BodyEncoding {
    fn from(arg: BodyEncodingArg) -> Self {
        match arg {
            BodyEncodingArg::Json => Self::Json,
            BodyEncodingArg::Form => Self::Form,
        }
    }
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| config.default_profile_name().to_owned())
}

/// Build a `ControllerConfig` from the config file, profile, and CLI overrides.
pub fn build_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg, global);
    }

    // An explicitly requested profile must exist
    if global.profile.is_some() && global.server.is_none() {
        return Err(devgrid_config::ConfigError::ProfileNotFound {
            name: profile_name,
            available: cfg.profile_names(),
        }
        .into());
    }

    // No profile: build from flags / env alone
    let server = global.server.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let profile = Profile {
        server: server.to_owned(),
        ..Profile::default()
    };
    resolve_profile(&profile, &profile_name, &cfg, global)
}

/// Translate a `Profile` + global flags into a `ControllerConfig`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<ControllerConfig, CliError> {
    let mut profile = profile.clone();
    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }

    let mut config =
        devgrid_config::profile_to_controller_config(&profile, profile_name, &cfg.defaults)?;

    if let Some(ref token) = global.token {
        config.token = Some(SecretString::from(token.clone()));
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = global.dispatch_timeout {
        config.dispatch_timeout = Duration::from_secs(secs);
    }
    if let Some(encoding) = global.body_encoding {
        config.body_encoding = encoding.into();
    }

    Ok(config)
}
