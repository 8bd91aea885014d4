use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use paperweave::{Registry, WeaveError, exit_code, run_ninja};

#[derive(Parser, Debug)]
#[command(version, about = "Generate build.ninja from paperweave.yaml files and run Ninja")]
struct Args {
    /// Directory containing the top-level paperweave.yaml.
    #[arg(short = 'C', long, default_value = ".")]
    root: Utf8PathBuf,

    #[command(subcommand)]
    mode: Option<Mode>,

    /// Without a subcommand, build and pass these arguments to Ninja.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    ninja: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
enum Mode {
    /// Only write build.ninja.
    Generate,
    /// Write build.ninja, then run Ninja with the remaining arguments.
    Build {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        ninja: Vec<String>,
    },
    /// Build, then rebuild whenever a source file changes.
    #[cfg(feature = "watch")]
    Watch {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        ninja: Vec<String>,
    },
}

#[cfg(feature = "logging")]
fn init_logging() -> anyhow::Result<()> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .try_init()?;

    Ok(())
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    #[cfg(feature = "logging")]
    init_logging()?;

    let root = args
        .root
        .canonicalize_utf8()
        .map_err(|e| WeaveError::Root(args.root.clone(), e))?;
    std::env::set_current_dir(&root).map_err(|e| WeaveError::Root(root.clone(), e))?;

    let registry = Registry::default();

    match args.mode.unwrap_or(Mode::Build { ninja: args.ninja }) {
        Mode::Generate => {
            paperweave::generate(&root, &registry)?;
            Ok(ExitCode::SUCCESS)
        }
        Mode::Build { ninja } => {
            paperweave::generate(&root, &registry)?;
            let status = run_ninja(&ninja)?;
            Ok(ExitCode::from(exit_code(status)))
        }
        #[cfg(feature = "watch")]
        Mode::Watch { ninja } => {
            paperweave::watch(&root, &registry, &ninja)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn default_mode_forwards_arguments() {
        let args = parse(&["paperweave", "-j4", "paper.pdf"]);
        assert!(args.mode.is_none());
        assert_eq!(args.ninja, ["-j4", "paper.pdf"]);

        let args = parse(&["paperweave", "-C", "thesis", "paper.pdf"]);
        assert_eq!(args.root, "thesis");
        assert_eq!(args.ninja, ["paper.pdf"]);
    }

    #[test]
    fn subcommands() {
        assert!(matches!(parse(&["paperweave", "generate"]).mode, Some(Mode::Generate)));

        let args = parse(&["paperweave", "-C", "thesis", "generate"]);
        assert_eq!(args.root, "thesis");
        assert!(matches!(args.mode, Some(Mode::Generate)));

        let args = parse(&["paperweave", "build", "-v", "-j", "2"]);
        let Some(Mode::Build { ninja }) = args.mode else {
            panic!("expected the build subcommand");
        };
        assert_eq!(ninja, ["-v", "-j", "2"]);
        assert!(args.ninja.is_empty());
    }
}
