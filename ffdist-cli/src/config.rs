//! Configuration file loading and command line overrides.
//!
//! ```toml
//! segment_seconds = 20
//! transcode_args = ["-c:v", "libx265", "-crf", "26"]
//!
//! [[hosts]]
//! name = "localhost"
//!
//! [[hosts]]
//! name = "encoder@box2"
//! transport_args = ["-p", "2222"]
//!
//! [remote]
//! args = ["-o", "BatchMode=yes"]
//! ```

use std::path::Path;

use anyhow::Context;
use ffdist::{EncodeConfig, Host};

use crate::cli::Args;

/// Read `path` as TOML, or start from defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<EncodeConfig> {
    let Some(path) = path else {
        return Ok(EncodeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn parse(text: &str) -> anyhow::Result<EncodeConfig> {
    Ok(toml::from_str(text)?)
}

/// Apply command line options on top of a loaded config.
///
/// Hosts given on the command line replace the configured list; a host that
/// is also configured keeps its transport arguments.
pub fn apply_args(config: &mut EncodeConfig, args: &Args) {
    if !args.hosts.is_empty() {
        config.hosts = args
            .hosts
            .iter()
            .map(|name| {
                config
                    .hosts
                    .iter()
                    .find(|h| &h.name == name)
                    .cloned()
                    .unwrap_or_else(|| Host::new(name.clone()))
            })
            .collect();
    }

    if let Some(secs) = args.segment_length {
        config.segment_seconds = secs;
    }
    if !args.ffmpeg_args.is_empty() {
        config.transcode_args = args.ffmpeg_args.clone();
    }
    config.split_args.extend(args.split_args.iter().cloned());
    config.remote.args.extend(args.ssh_args.iter().cloned());

    if let Some(dir) = &args.tmp_dir {
        config.work_dir = Some(dir.clone());
    }
    config.keep_work_dir |= args.keep_tmp;
    config.resume |= args.resume;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const SAMPLE: &str = r#"
segment_seconds = 20
transcode_args = ["-c:v", "libx265", "-crf", "26"]

[[hosts]]
name = "localhost"

[[hosts]]
name = "encoder@box2"
transport_args = ["-p", "2222"]

[remote]
args = ["-o", "BatchMode=yes"]

[monitor]
poll_interval_ms = 50
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.segment_seconds, 20.0);
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[1].transport_args, vec!["-p", "2222"]);
        assert_eq!(config.remote.program, "ssh");
        assert_eq!(config.monitor.poll_interval_ms, 50);
        assert_eq!(config.monitor.reap_grace_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_mistyped_values() {
        assert!(parse("segment_seconds = \"ten\"").is_err());
        assert!(parse("").unwrap().hosts.is_empty());
    }

    #[test]
    fn test_command_line_overrides() {
        let mut config = parse(SAMPLE).unwrap();
        let args = Args::parse_from([
            "ffdist",
            "-H",
            "encoder@box2",
            "-H",
            "box3",
            "-s",
            "5",
            "-r",
            "--ssh-arg=-T",
            "in.mkv",
            "out.mkv",
        ]);
        apply_args(&mut config, &args);

        let names: Vec<_> = config.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["encoder@box2", "box3"]);
        assert_eq!(config.hosts[0].transport_args, vec!["-p", "2222"]);
        assert!(config.hosts[1].transport_args.is_empty());
        assert_eq!(config.segment_seconds, 5.0);
        assert!(config.resume);
        assert!(!config.keep_work_dir);
        assert_eq!(config.remote.args, vec!["-o", "BatchMode=yes", "-T"]);
        // No trailing args keeps the configured transcode args.
        assert_eq!(config.transcode_args, vec!["-c:v", "libx265", "-crf", "26"]);
    }

    #[test]
    fn test_load_missing_file_names_it() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("ffdist.toml");
        let err = load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("ffdist.toml"));
        assert_eq!(load(None).unwrap(), EncodeConfig::default());
    }
}
