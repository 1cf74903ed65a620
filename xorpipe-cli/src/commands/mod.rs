// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod consume;
pub mod init;
pub mod produce;
pub mod shutdown;
pub mod stats;
pub mod validate;

use xorpipe_core::{Config, ConfigLoader, PipeResult, SegmentName, XorKey};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Load the session file if one was given, otherwise start from defaults.
pub fn load_config(path: Option<&str>) -> PipeResult<Config> {
    match path {
        Some(path) => ConfigLoader::load_file(path),
        None => Ok(Config::default()),
    }
}

/// Command-line segment name, falling back to the session file.
pub fn segment_name(
    config: &Config,
    arg: Option<String>,
) -> Result<SegmentName, Box<dyn std::error::Error>> {
    match arg {
        Some(name) => Ok(SegmentName::new(name)?),
        None => config
            .session
            .segment
            .clone()
            .ok_or_else(|| "no segment given (use --segment or session.segment)".into()),
    }
}

/// Command-line key, falling back to the session file.
pub fn xor_key(config: &Config, arg: Option<String>) -> Result<XorKey, Box<dyn std::error::Error>> {
    match arg {
        Some(key) => Ok(key.parse::<XorKey>()?),
        None => config
            .session
            .key
            .ok_or_else(|| "no key given (use --key or session.key)".into()),
    }
}
