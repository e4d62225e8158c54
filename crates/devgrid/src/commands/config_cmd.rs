//! Config subcommand handlers.

use std::fmt::Write as _;

use dialoguer::{Input, Select};

use devgrid_core::{BodyEncoding, DispatchPolicy};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const SET_KEYS: &str = "server, token_env, insecure, timeout, dispatch_timeout, \
                        dispatch_policy, body_encoding, ca_cert";

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking tokens.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "dispatch_timeout = {}", cfg.defaults.dispatch_timeout);

    for name in cfg.profile_names() {
        let p = &cfg.profiles[&name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "server = \"{}\"", p.server);
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"****\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(timeout) = p.dispatch_timeout {
            let _ = writeln!(out, "dispatch_timeout = {timeout}");
        }
        if let Some(policy) = p.dispatch_policy {
            let _ = writeln!(out, "dispatch_policy = \"{policy}\"");
        }
        if let Some(encoding) = p.body_encoding {
            let encoding = match encoding {
                BodyEncoding::Json => "json",
                BodyEncoding::Form => "form",
            };
            let _ = writeln!(out, "body_encoding = \"{encoding}\"");
        }
    }

    out
}

/// Structured view of the config with plaintext tokens masked.
fn redacted_value(cfg: &Config) -> Result<serde_json::Value, CliError> {
    let mut value = serde_json::to_value(cfg)?;
    if let Some(profiles) = value
        .get_mut("profiles")
        .and_then(serde_json::Value::as_object_mut)
    {
        for profile in profiles.values_mut() {
            if let Some(token) = profile.get_mut("token").filter(|t| !t.is_null()) {
                *token = serde_json::Value::String("****".into());
            }
        }
    }
    Ok(value)
}

fn save_config(cfg: &Config) -> Result<(), CliError> {
    config::save_config(cfg)?;
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str, hint: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: hint.into(),
    })
}

fn parse_body_encoding(value: &str) -> Result<BodyEncoding, CliError> {
    match value {
        "json" => Ok(BodyEncoding::Json),
        "form" => Ok(BodyEncoding::Form),
        _ => Err(CliError::Validation {
            field: "body_encoding".into(),
            reason: "must be 'json' or 'form'".into(),
        }),
    }
}

/// Ask for a bearer token and decide where it lives.
///
/// Returns `(plaintext_token, token_env)` for the profile.
fn prompt_token(profile_name: &str) -> Result<(Option<String>, Option<String>), CliError> {
    let choices = &[
        "No token (backend is open)",
        "Store in system keyring (recommended)",
        "Read from an environment variable",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Bearer token")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    match selection {
        0 => Ok((None, None)),
        2 => {
            let var: String = Input::new()
                .with_prompt("Environment variable name")
                .default("DEVGRID_HUB_TOKEN".into())
                .interact_text()
                .map_err(prompt_err)?;
            Ok((None, Some(var)))
        }
        choice => {
            let token = rpassword::prompt_password("Token: ").map_err(prompt_err)?;
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            if choice == 1 {
                devgrid_config::store_token(profile_name, &token)?;
                eprintln!("   ✓ Token stored in system keyring");
                Ok((None, None))
            } else {
                Ok((Some(token), None))
            }
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let value = redacted_value(&cfg)?;
            let out = output::render_single(
                &global.output,
                &value,
                |_| format_config_redacted(&cfg),
                |_| config::config_path().display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();

            match key.as_str() {
                "server" => {
                    devgrid_config::parse_server_url(&value)?;
                    profile.server = value;
                }
                "token_env" | "token-env" => profile.token_env = Some(value),
                "insecure" => {
                    profile.insecure =
                        Some(parse_field("insecure", &value, "must be 'true' or 'false'")?);
                }
                "timeout" => {
                    profile.timeout =
                        Some(parse_field("timeout", &value, "must be a number (seconds)")?);
                }
                "dispatch_timeout" | "dispatch-timeout" => {
                    profile.dispatch_timeout = Some(parse_field(
                        "dispatch_timeout",
                        &value,
                        "must be a number (seconds)",
                    )?);
                }
                "dispatch_policy" | "dispatch-policy" => {
                    profile.dispatch_policy = Some(parse_field::<DispatchPolicy>(
                        "dispatch_policy",
                        &value,
                        "must be 'supersede' or 'last-response-wins'",
                    )?);
                }
                "body_encoding" | "body-encoding" => {
                    profile.body_encoding = Some(parse_body_encoding(&value)?);
                }
                "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
                other => {
                    return Err(CliError::Validation {
                        field: other.into(),
                        reason: format!("unknown config key '{other}'. Valid keys: {SET_KEYS}"),
                    });
                }
            }

            save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile_name();
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: devgrid config init");
            } else {
                for name in cfg.profile_names() {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            cfg.profile(&name)?;
            cfg.default_profile = Some(name.clone());
            save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }

        ConfigCommand::SetToken { name } => {
            let cfg = config::load_config_or_default();
            let profile_name = name.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            cfg.profile(&profile_name)?;

            let token = rpassword::prompt_password("Token: ").map_err(prompt_err)?;
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            devgrid_config::store_token(&profile_name, &token)?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }
    }
}

/// Interactive wizard: writes (or adds) a profile and makes it the default.
fn init() -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("devgrid configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let server: String = Input::new()
        .with_prompt("Backend URL")
        .default("http://localhost:8080".into())
        .validate_with(|input: &String| -> Result<(), String> {
            devgrid_config::parse_server_url(input)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(prompt_err)?;

    let (token, token_env) = prompt_token(&profile_name)?;

    let policies = &[
        "Supersede: a new command cancels the pending one (recommended)",
        "Last response wins: every command runs to completion",
    ];
    let dispatch_policy = match Select::new()
        .with_prompt("When a device gets a second command before the first answers")
        .items(policies)
        .default(0)
        .interact()
        .map_err(prompt_err)?
    {
        0 => DispatchPolicy::Supersede,
        _ => DispatchPolicy::LastResponseWins,
    };

    let profile = Profile {
        server,
        token,
        token_env,
        dispatch_policy: Some(dispatch_policy),
        ..Profile::default()
    };

    let mut cfg = config::load_config_or_default();
    cfg.profiles.insert(profile_name.clone(), profile);
    cfg.default_profile = Some(profile_name.clone());
    save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: devgrid devices list");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                server: "http://hub.local".into(),
                token: Some("s3cret".into()),
                body_encoding: Some(BodyEncoding::Form),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn text_view_masks_tokens() {
        let out = format_config_redacted(&sample());
        assert!(out.contains("[profiles.home]"));
        assert!(out.contains("token = \"****\""));
        assert!(out.contains("body_encoding = \"form\""));
        assert!(!out.contains("s3cret"));
    }

    #[test]
    fn structured_view_masks_tokens() {
        let value = redacted_value(&sample()).unwrap();
        assert_eq!(value["profiles"]["home"]["token"], "****");
        assert!(!value.to_string().contains("s3cret"));
    }

    #[test]
    fn body_encoding_values_are_checked() {
        assert_eq!(parse_body_encoding("form").unwrap(), BodyEncoding::Form);
        assert!(parse_body_encoding("xml").is_err());
    }
}
