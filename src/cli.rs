use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "promptrun", about = "Run interactive scripts in a terminal console", version)]
#[command(group(ArgGroup::new("source").args(["script", "eval"]).required(true).multiple(false)))]
pub struct Cli {
    /// Script file to run. Use `-` to read the script from stdin.
    #[arg(value_name = "SCRIPT")]
    pub script: Option<PathBuf>,

    /// Run the given code instead of a file.
    #[arg(short = 'e', long)]
    pub eval: Option<String>,

    /// Pre-fill a reply for the script's next `prompt`.
    /// Can be used multiple times: --input Ada --input 42
    #[arg(short = 'i', long = "input", action = clap::ArgAction::Append)]
    pub input: Vec<String>,

    /// Stream the transcript to stdout instead of opening the terminal UI.
    ///
    /// Implied when stdin or stdout is not a terminal.
    #[arg(long)]
    pub plain: bool,

    /// Largest delay accepted by setTimeout/setInterval, in milliseconds.
    #[arg(long = "timer-ceiling-ms", value_parser = clap::value_parser!(u64))]
    pub timer_ceiling_ms: Option<u64>,

    /// Pause between stopping a run and starting the next one, in milliseconds.
    #[arg(long = "grace-ms", value_parser = clap::value_parser!(u64))]
    pub grace_ms: Option<u64>,

    /// Log filter, e.g. `debug` or `promptrun::transcript=debug`.
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// The script reads from stdin, so stdin cannot also answer prompts.
    pub fn script_from_stdin(&self) -> bool {
        self.script.as_deref().is_some_and(|p| p.as_os_str() == "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_with_prefilled_inputs() {
        let cli = Cli::try_parse_from(["promptrun", "demo.js", "--input", "Ada", "-i", "42", "--plain"]).unwrap();
        assert_eq!(cli.script.as_deref(), Some(std::path::Path::new("demo.js")));
        assert_eq!(cli.input, ["Ada", "42"]);
        assert!(cli.plain);
        assert!(!cli.script_from_stdin());
    }

    #[test]
    fn script_and_eval_are_exclusive() {
        assert!(Cli::try_parse_from(["promptrun", "demo.js", "--eval", "1"]).is_err());
        assert!(Cli::try_parse_from(["promptrun"]).is_err());
        let cli = Cli::try_parse_from(["promptrun", "-"]).unwrap();
        assert!(cli.script_from_stdin());
    }
}
