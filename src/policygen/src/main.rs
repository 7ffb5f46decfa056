// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::info;
use policygen::logger::{LOGGER, LevelFilter};
use policygen::{DEFAULT_TEMPLATE, GenerateError, SystemConfig};

const EXIT_CODE_ERROR: i32 = 1;

#[rustfmt::skip]
#[derive(Debug, thiserror::Error, displaydoc::Display)]
enum Error {
    /// Failed to read {0}: {1}
    ReadInput(PathBuf, std::io::Error),
    /// Failed to parse system description: {0}
    ParseConfig(#[from] serde_json::Error),
    /// {0}
    Generate(#[from] GenerateError),
    /// Failed to write {0}: {1}
    WriteOutput(PathBuf, std::io::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Parser)]
#[command(version, about = "Generates the subject policy header from a system description.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Level of diagnostic output on stderr.
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LevelFilter,
    /// Include the log record origin (file:line) in diagnostic output.
    #[arg(long, global = true)]
    log_origin: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a policy header from a system description.
    Generate {
        /// Path of the JSON system description.
        #[arg(short, long, value_name = "PATH")]
        config: PathBuf,
        /// Path of the header template. Defaults to the built-in subject
        /// policy template.
        #[arg(short, long, value_name = "PATH")]
        template: Option<PathBuf>,
        /// Path of the output header.
        #[arg(short, long, value_name = "PATH", default_value = "policy.h")]
        output: PathBuf,
    },
    /// Validate a system description against a template without writing
    /// any output.
    Check {
        /// Path of the JSON system description.
        #[arg(short, long, value_name = "PATH")]
        config: PathBuf,
        /// Path of the header template. Defaults to the built-in subject
        /// policy template.
        #[arg(short, long, value_name = "PATH")]
        template: Option<PathBuf>,
    },
}

fn load_config(path: &Path) -> Result<SystemConfig> {
    let json = read_to_string(path).map_err(|err| Error::ReadInput(path.to_path_buf(), err))?;
    Ok(serde_json::from_str(&json)?)
}

fn load_template(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            read_to_string(path).map_err(|err| Error::ReadInput(path.to_path_buf(), err))
        }
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            config,
            template,
            output,
        } => {
            let config = load_config(&config)?;
            let template = load_template(template.as_deref())?;
            // The header is complete before the output file is created, so
            // a failed run never leaves a partial file behind.
            let header = policygen::generate(&template, &config)?;
            std::fs::write(&output, header)
                .map_err(|err| Error::WriteOutput(output.clone(), err))?;
            info!(
                "generated policy header for {} subject(s)",
                config.subjects.len()
            );
            println!("Policy header written to: {}", output.display());
        }
        Command::Check { config, template } => {
            let config = load_config(&config)?;
            let template = load_template(template.as_deref())?;
            policygen::generate(&template, &config)?;
            println!("System description OK");
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    LOGGER.set_include_origin(cli.log_origin);
    if LOGGER.init(cli.log_level.into()).is_err() {
        eprintln!("Failed to initialize logger");
    }

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(EXIT_CODE_ERROR);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use vmm_sys_util::tempdir::TempDir;
    use vmm_sys_util::tempfile::TempFile;

    use super::*;

    fn sample_json() -> &'static str {
        r#"
        {
            "cpu": { "count": 4 },
            "memory": {
                "kernel_stack": "0x112000",
                "kernel_pml4": "0x200000",
                "percpu": { "base": "0x1fe000", "size": "0x2000" },
                "vmxon": "0x204000",
                "vmcs": "0x208000"
            },
            "subjects": [ { "name": "vt" }, { "name": "nic_linux" } ]
        }
        "#
    }

    fn write_config(contents: &str) -> TempFile {
        let file = TempFile::new().unwrap();
        file.as_file().write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_generate_with_builtin_template() {
        let config = write_config(sample_json());
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.as_path().join("policy.h");

        let cli = Cli {
            command: Command::Generate {
                config: config.as_path().to_path_buf(),
                template: None,
                output: output.clone(),
            },
            log_level: LevelFilter::Warn,
            log_origin: false,
        };
        run(cli).unwrap();

        let header = read_to_string(&output).unwrap();
        assert!(header.contains("#define CPU_COUNT     4"));
        assert!(header.contains("#define SUBJECT_COUNT 2"));
        assert!(header.contains("#define VMCS_ADDRESS  0x208000"));
        assert!(!header.contains("__"));
    }

    #[test]
    fn test_generate_with_template_file() {
        let config = write_config(sample_json());
        let template = write_config("#define CPU_COUNT __cpu_count__\n");
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.as_path().join("policy.h");

        let cli = Cli {
            command: Command::Generate {
                config: config.as_path().to_path_buf(),
                template: Some(template.as_path().to_path_buf()),
                output: output.clone(),
            },
            log_level: LevelFilter::Warn,
            log_origin: false,
        };
        run(cli).unwrap();

        assert_eq!(read_to_string(&output).unwrap(), "#define CPU_COUNT 4\n");
    }

    #[test]
    fn test_generate_fails_closed() {
        // Invalid system description: zero CPUs. No output file may be
        // written.
        let json = sample_json().replace("\"count\": 4", "\"count\": 0");
        let config = write_config(&json);
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.as_path().join("policy.h");

        let cli = Cli {
            command: Command::Generate {
                config: config.as_path().to_path_buf(),
                template: None,
                output: output.clone(),
            },
            log_level: LevelFilter::Warn,
            log_origin: false,
        };
        match run(cli).unwrap_err() {
            Error::Generate(_) => {}
            err => panic!("Expected Generate error, got {err}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_generate_missing_config_file() {
        let mut missing = TempFile::new().unwrap();
        missing.remove().unwrap();
        let path = missing.as_path().to_path_buf();

        let cli = Cli {
            command: Command::Check {
                config: path.clone(),
                template: None,
            },
            log_level: LevelFilter::Warn,
            log_origin: false,
        };
        match run(cli).unwrap_err() {
            Error::ReadInput(reported, _) => assert_eq!(reported, path),
            err => panic!("Expected ReadInput error, got {err}"),
        }
    }

    #[test]
    fn test_generate_malformed_config() {
        let config = write_config("{ not json");

        let cli = Cli {
            command: Command::Check {
                config: config.as_path().to_path_buf(),
                template: None,
            },
            log_level: LevelFilter::Warn,
            log_origin: false,
        };
        match run(cli).unwrap_err() {
            Error::ParseConfig(_) => {}
            err => panic!("Expected ParseConfig error, got {err}"),
        }
    }

    #[test]
    fn test_check_does_not_write() {
        let config = write_config(sample_json());

        let cli = Cli {
            command: Command::Check {
                config: config.as_path().to_path_buf(),
                template: None,
            },
            log_level: LevelFilter::Warn,
            log_origin: false,
        };
        run(cli).unwrap();
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "policygen",
            "generate",
            "--config",
            "system.json",
            "--output",
            "out/policy.h",
        ])
        .unwrap();
        match cli.command {
            Command::Generate {
                config,
                template,
                output,
            } => {
                assert_eq!(config, PathBuf::from("system.json"));
                assert_eq!(template, None);
                assert_eq!(output, PathBuf::from("out/policy.h"));
            }
            _ => panic!("Expected generate subcommand"),
        }

        // Missing --config.
        assert!(Cli::try_parse_from(["policygen", "generate"]).is_err());
        // Unknown log level.
        assert!(
            Cli::try_parse_from(["policygen", "check", "--config", "c.json", "--log-level", "x"])
                .is_err()
        );
    }
}
