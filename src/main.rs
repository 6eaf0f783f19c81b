use std::io::Read;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use anyhow::{bail, Context};
use quiz_tutor::config::{Secrets, Settings};
use quiz_tutor::export::ResultsBundle;
use quiz_tutor::feedback::{Feedback, Summary};
use quiz_tutor::history::{HistoryEntry, HistoryQuery};
use quiz_tutor::session::{Advance, Completion, Progress, Rejection, SessionFile, Submission};
use quiz_tutor::{HistoryRecord, QuizEngine, SessionState};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const USAGE: &str = "Usage: quiz-tutor [--config <file>] [--subject <name>] <command>

Commands:
  show                      current question or final results
  answer [text...]          grade an answer (reads stdin when no text is given)
  next                      move to the next question
  finish                    summary and score of a completed quiz
  reset                     start the subject again
  history [--all] [--search <text>]
  delete <timestamp>        remove one history record
  export [output_dir]       write the results bundle as JSON";

#[derive(Debug, PartialEq)]
enum Command {
    Quiz(QuizCommand),
    History { all: bool, search: Option<String> },
    Delete(String),
    Export(String),
}

/// Commands that run against a loaded question bank and grader.
#[derive(Debug, PartialEq)]
enum QuizCommand {
    Show,
    Answer(String),
    Next,
    Finish,
    Reset,
}

struct Config {
    config_path: Option<PathBuf>,
    subject: Option<String>,
    command: Command,
}

fn parse_config(mut args: impl Iterator<Item = String>) -> anyhow::Result<Config> {
    let mut config_path = None;
    let mut subject = None;

    let command = loop {
        let arg = args.next().context("a command is required")?;
        match arg.as_str() {
            "--config" => config_path = Some(PathBuf::from(args.next().context("--config needs a file")?)),
            "--subject" => subject = Some(args.next().context("--subject needs a name")?),
            _ => break arg,
        }
    };

    let command = match command.as_str() {
        "show" => Command::Quiz(QuizCommand::Show),
        "answer" => Command::Quiz(QuizCommand::Answer(args.collect::<Vec<_>>().join(" "))),
        "next" => Command::Quiz(QuizCommand::Next),
        "finish" => Command::Quiz(QuizCommand::Finish),
        "reset" => Command::Quiz(QuizCommand::Reset),
        "history" => {
            let mut all = false;
            let mut search = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--all" => all = true,
                    "--search" => search = Some(args.next().context("--search needs a text")?),
                    other => bail!("unknown history option {}", other),
                }
            }
            Command::History { all, search }
        }
        "delete" => Command::Delete(args.next().context("delete needs a record timestamp")?),
        "export" => Command::Export(args.next().unwrap_or_else(|| String::from("."))),
        other => bail!("unknown command {}", other),
    };

    Ok(Config {
        config_path,
        subject,
        command,
    })
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let config = match parse_config(env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", USAGE);
            return Err(e);
        }
    };

    let settings = Settings::load(config.config_path.as_deref()).context("failed to load settings")?;
    let secrets = Secrets::from_env();
    let subject = config
        .subject
        .clone()
        .unwrap_or_else(|| settings.default_subject.clone());

    let history = settings
        .history_store(&secrets)
        .context("failed to open history store")?;
    let sessions = SessionFile::in_dir(&settings.data_dir);

    match config.command {
        Command::History { all, search } => {
            let query = HistoryQuery {
                subject: (!all).then(|| subject.clone()),
                search,
            };
            let records = query.run(history.as_ref()).context("failed to read history")?;
            print_history(&records);
        }
        Command::Delete(timestamp) => {
            history
                .delete_by_timestamp(&timestamp)
                .context(format!("failed to delete record {}", timestamp))?;
            println!("deleted {BOLD}{}{RESET}", timestamp);
        }
        Command::Export(output_dir) => {
            let state = sessions.load(&subject).context("failed to load session")?;
            export(&state, &output_dir)?;
        }
        Command::Quiz(command) => {
            let bank = settings
                .question_bank(&secrets)
                .context("failed to open question bank")?;
            let questions = bank
                .load(&subject)
                .context(format!("failed to load {} questions", subject))?;
            let grader = settings
                .grading_client(&secrets)
                .context("OPENAI_API_KEY is required to run a quiz")?;
            let engine = QuizEngine::new(
                &subject,
                &questions,
                &grader,
                history.as_ref(),
                &settings.grade_level,
            )?;
            run_quiz(command, &engine, &sessions)?;
        }
    }

    Ok(())
}

/// Runs one quiz command. The session file is written before anything is reported.
fn run_quiz(command: QuizCommand, engine: &QuizEngine, sessions: &SessionFile) -> anyhow::Result<()> {
    let mut state = sessions
        .load(engine.subject())
        .context("failed to load session")?;
    let save = |state: &SessionState| sessions.save(state).context("failed to save session");

    match command {
        QuizCommand::Show => show(engine, &state)?,
        QuizCommand::Answer(text) => {
            let text = if text.trim().is_empty() {
                let mut buffer = String::new();
                io::stdin()
                    .read_to_string(&mut buffer)
                    .context("failed to read answer from stdin")?;
                buffer
            } else {
                text
            };

            let submission = engine.submit(&mut state, &text);
            save(&state)?;
            match submission? {
                Submission::Graded { feedback, warning } => {
                    print_feedback(&feedback);
                    if let Some(e) = warning {
                        eprintln!("warning: answer graded but not saved to history: {}", e);
                    }
                }
                Submission::Rejected(Rejection::EmptyAnswer) => bail!("please enter an answer"),
                Submission::Rejected(Rejection::AlreadyGraded) => {
                    println!("already graded, run `next` to continue")
                }
                Submission::Rejected(Rejection::QuizComplete) => {
                    println!("quiz is complete, run `finish` or `reset`")
                }
            }
        }
        QuizCommand::Next => match engine.advance(&mut state)? {
            Advance::Moved { .. } => {
                save(&state)?;
                show(engine, &state)?;
            }
            Advance::Completed | Advance::AlreadyComplete => {
                let completion = engine.complete(&mut state);
                save(&state)?;
                print_completion(&completion?);
            }
            Advance::NotAnswered => bail!("answer the current question before moving on"),
        },
        QuizCommand::Finish => {
            let completion = engine.complete(&mut state);
            save(&state)?;
            print_completion(&completion?);
        }
        QuizCommand::Reset => {
            engine.reset(&mut state)?;
            save(&state)?;
            println!("{BOLD}{}{RESET} starts again from question 1", engine.subject());
        }
    }
    Ok(())
}

fn show(engine: &QuizEngine, state: &SessionState) -> anyhow::Result<()> {
    let total = engine.questions().len();
    match engine.progress(state)? {
        Progress::AwaitingAnswer { index, answered } => {
            let Some(question) = engine.current_question(state)? else {
                return Ok(());
            };
            println!(
                "{BOLD}Question {} of {}{RESET} ({}, {} marks)",
                index + 1,
                total,
                question.topic,
                question.marks
            );
            println!("{}", question.prompt);
            if answered {
                if let Some(answer) = state.answer(&question.id) {
                    println!("\nYour answer: {}", answer);
                }
                if let Some(feedback) = state.feedback(&question.id) {
                    print_feedback(feedback);
                }
            } else if question.wants_multiline() {
                println!("\n(longer answer expected; pipe it through stdin)");
            }
        }
        Progress::Complete => match state.summary() {
            Some(summary) => print_summary(summary),
            None => println!("all {} questions answered, run `finish` for the summary", total),
        },
    }
    Ok(())
}

fn print_list(title: &str, items: &[String]) {
    println!("{BOLD}{}{RESET}", title);
    if items.is_empty() {
        println!("  -");
    }
    for item in items {
        println!("  - {}", item);
    }
}

fn print_feedback(feedback: &Feedback) {
    println!(
        "\n{BOLD}{}{RESET} (score: {})",
        feedback.verdict.label(),
        feedback.score_band
    );
    println!("{}", feedback.feedback);
    if !feedback.model_answer.is_empty() {
        println!("\n{BOLD}Model answer{RESET}\n{}", feedback.model_answer);
    }
    if !feedback.why.is_empty() {
        println!("\n{BOLD}Why{RESET}\n{}", feedback.why);
    }
    print_list("Misconceptions", &feedback.misconceptions);
    print_list("Next steps", &feedback.next_steps);
    for link in &feedback.video_links {
        println!("  video: {} <{}>", link.query, link.url);
    }
}

fn print_summary(summary: &Summary) {
    println!("{BOLD}Overall summary{RESET}\n{}", summary.overall_summary);
    print_list("Strengths", &summary.strengths);
    print_list("Gaps", &summary.gaps);
    print_list("Misconceptions", &summary.misconceptions_to_fix);
    print_list("Learning points", &summary.key_learning_points);
    print_list("Recommended next topics", &summary.recommended_next_topics);
}

fn print_completion(completion: &Completion) {
    println!("{BOLD}Final score: {}{RESET}\n", completion.score);
    print_summary(&completion.summary);
    if let Some(e) = &completion.warning {
        eprintln!("warning: summary not saved to history: {}", e);
    }
}

fn print_history(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("no history yet");
    }
    for record in records {
        match &record.entry {
            HistoryEntry::Question(q) => println!(
                "{BOLD}{}{RESET} [{}] {} {}: {} ({})",
                record.timestamp,
                record.subject,
                q.question_id,
                q.question_topic,
                q.feedback.verdict.label(),
                q.feedback.score_band
            ),
            HistoryEntry::Summary { content } => println!(
                "{BOLD}{}{RESET} [{}] summary: {}",
                record.timestamp, record.subject, content.overall_summary
            ),
        }
    }
}

fn export(state: &SessionState, output_dir: &str) -> anyhow::Result<()> {
    let bundle = ResultsBundle::from_session(state);
    let content = bundle.to_json().context("failed to serialize results")?;

    fs::create_dir_all(output_dir).context("failed to create output directory")?;
    let path = Path::new(output_dir).join(bundle.file_name());
    fs::write(&path, content).context(format!("failed to write {}", path.display()))?;

    println!("wrote results to {BOLD}{}{RESET}", path.display());
    Ok(())
}
