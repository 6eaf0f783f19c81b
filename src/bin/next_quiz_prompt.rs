use std::path::PathBuf;
use std::{env, fs};

use anyhow::Context;
use quiz_tutor::config::{Secrets, Settings};
use quiz_tutor::export::{next_quiz_prompt, NEXT_QUIZ_PROMPT_FILE};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub struct Config {
    pub config_path: Option<PathBuf>,
    pub output_file: String,
    pub subject: Option<String>,
}

fn parse_config(mut args: impl Iterator<Item = String>) -> anyhow::Result<Config> {
    let mut config_path = None;
    let mut output_file = None;
    let mut subject = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(args.next().context("--config needs a file")?)),
            "--subject" => subject = Some(args.next().context("--subject needs a name")?),
            _ if output_file.is_none() => output_file = Some(arg),
            other => anyhow::bail!("unexpected argument {}", other),
        }
    }

    Ok(Config {
        config_path,
        output_file: output_file.unwrap_or_else(|| NEXT_QUIZ_PROMPT_FILE.to_string()),
        subject,
    })
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let config = match parse_config(env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Usage: next_quiz_prompt [--config <file>] [--subject <name>] [output_file]");
            return Err(e);
        }
    };

    let settings = Settings::load(config.config_path.as_deref()).context("failed to load settings")?;
    let history = settings
        .history_store(&Secrets::from_env())
        .context("failed to open history store")?;
    let records = history
        .read_all(config.subject.as_deref())
        .context("failed to read history")?;

    let Some(prompt) = next_quiz_prompt(&records).context("failed to serialize history")? else {
        println!("no history available to build a prompt from");
        return Ok(());
    };

    fs::write(&config.output_file, prompt)
        .context(format!("failed to write {}", config.output_file))?;

    println!(
        "wrote a prompt covering {BOLD}{}{RESET} records to {BOLD}{}{RESET}",
        records.len(),
        config.output_file
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|a| a.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn defaults_to_the_standard_prompt_file() {
        let config = parse_config(args(&[])).unwrap();

        assert_eq!(config.config_path, None);
        assert_eq!(config.output_file, NEXT_QUIZ_PROMPT_FILE);
        assert_eq!(config.subject, None);
    }

    #[test]
    fn reads_config_subject_and_output_file() {
        let config = parse_config(args(&[
            "--config",
            "tutor.yaml",
            "--subject",
            "Physics",
            "prompt.txt",
        ]))
        .unwrap();

        assert_eq!(config.config_path, Some(PathBuf::from("tutor.yaml")));
        assert_eq!(config.subject.as_deref(), Some("Physics"));
        assert_eq!(config.output_file, "prompt.txt");
    }

    #[test]
    fn config_without_a_file_is_rejected() {
        assert!(parse_config(args(&["--config"])).is_err());
        assert!(parse_config(args(&["a.txt", "b.txt"])).is_err());
    }
}
