use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vst2_sys::EffectOpcode;

use crate::effect::{Index, Opt, Value};
use crate::error::{HostError, Result};

/// Environment variable naming a JSON file read by
/// [`ProcessorConfig::from_env_or_default`].
pub const CONFIG_ENV: &str = "HARMONIQ_VST2_CONFIG";

/// Sample format negotiated with the plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Double when the plugin advertises it, single otherwise.
    #[default]
    Auto,
    Single,
    Double,
}

/// Raw dispatch issued after configuration and before the plugin starts.
/// The pointer argument is always null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchRequest {
    pub opcode: i32,
    pub index: Index,
    pub value: Value,
    pub opt: Opt,
}

impl DispatchRequest {
    pub fn new(opcode: EffectOpcode) -> Self {
        Self {
            opcode: opcode.0,
            ..Self::default()
        }
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.index = index;
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn with_opt(mut self, opt: Opt) -> Self {
        self.opt = opt;
        self
    }

    pub fn opcode(&self) -> EffectOpcode {
        EffectOpcode(self.opcode)
    }
}

/// Stream format and start-up options for a [`crate::Processor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub sample_rate: f64,
    pub channels: usize,
    pub precision: Precision,
    pub dispatch_before_start: Vec<DispatchRequest>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            channels: 2,
            precision: Precision::Auto,
            dispatch_before_start: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_dispatch(mut self, request: DispatchRequest) -> Self {
        self.dispatch_before_start.push(request);
        self
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| HostError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| HostError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the file named by [`CONFIG_ENV`], or the defaults when it is unset.
    pub fn from_env_or_default() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => {
                tracing::debug!(path = ?path, "loading processor config from environment");
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_common_stream_format() {
        let config = ProcessorConfig::default();
        assert_eq!(config.sample_rate, 44_100.0);
        assert_eq!(config.channels, 2);
        assert_eq!(config.precision, Precision::Auto);
        assert!(config.dispatch_before_start.is_empty());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "sample_rate": 48000.0,
                "precision": "single",
                "dispatch_before_start": [{{ "opcode": 44, "value": 1 }}]
            }}"#
        )
        .unwrap();

        let config = ProcessorConfig::load(file.path()).unwrap();
        assert_eq!(config.sample_rate, 48_000.0);
        assert_eq!(config.channels, 2);
        assert_eq!(config.precision, Precision::Single);
        assert_eq!(
            config.dispatch_before_start,
            vec![DispatchRequest::new(EffectOpcode::SET_BYPASS).with_value(1)]
        );
        assert_eq!(
            config.dispatch_before_start[0].opcode(),
            EffectOpcode::SET_BYPASS
        );
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = ProcessorConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, HostError::ConfigParse { .. }), "{err:?}");
    }

    #[test]
    fn missing_file_reports_io_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processor.json");
        match ProcessorConfig::load(&path).unwrap_err() {
            HostError::ConfigIo { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn builder_setters_chain() {
        let config = ProcessorConfig::default()
            .with_sample_rate(96_000.0)
            .with_channels(6)
            .with_precision(Precision::Double)
            .with_dispatch(DispatchRequest::new(EffectOpcode::SET_PROGRAM).with_value(3));
        assert_eq!(config.sample_rate, 96_000.0);
        assert_eq!(config.channels, 6);
        assert_eq!(config.precision, Precision::Double);
        assert_eq!(config.dispatch_before_start.len(), 1);
    }
}
