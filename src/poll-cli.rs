//! A command-line participant for live polls.
//! It talks to the document store directly, exactly as the browser client does,
//! and so needs no running server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rocket::futures::StreamExt;

use livepoll_backend::{
    model::{client_id::CLIENT_ID_KEY, ClientId, Rating},
    participant::Participant,
    results::{watch_results, ResultsView},
    session::{SessionState, SubmitError},
    store::{DocumentSnapshots, MongoStore, Store},
};

const PROGRAM_NAME: &str = "poll-cli";

const ABOUT_TEXT: &str = "Take part in, or watch the results of, a live poll.

EXIT CODES:
     0: Success.
     1: Error.";

const DB_URI: &str = "DB_URI";
const DATABASE: &str = "DATABASE";
const CLIENT_ID_FILE: &str = "CLIENT_ID_FILE";
const RATINGS: &str = "RATINGS";

const RESULTS: &str = "results";
const VOTE: &str = "vote";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .arg(
            Arg::new(DB_URI)
                .long("db-uri")
                .help("MongoDB connection string; the deployment must be a replica set")
                .default_value("mongodb://localhost:27017/?directConnection=true")
                .global(true),
        )
        .arg(
            Arg::new(DATABASE)
                .long("database")
                .help("Name of the database holding the poll")
                .default_value("livepoll")
                .global(true),
        )
        .subcommand(Command::new(RESULTS).about("Print the live results until interrupted"))
        .subcommand(
            Command::new(VOTE)
                .about("Wait for a question to go live, then rate its options")
                .arg(
                    Arg::new(RATINGS)
                        .long("ratings")
                        .help("One rating from 1 to 5 per option, in order, e.g. 5,3,4")
                        .action(ArgAction::Set)
                        .value_delimiter(',')
                        .value_parser(value_parser!(u8).range(1..=5))
                        .required(true),
                )
                .arg(
                    Arg::new(CLIENT_ID_FILE)
                        .long("client-id-file")
                        .help("Where this device's client ID is kept")
                        .value_parser(value_parser!(PathBuf))
                        .default_value(CLIENT_ID_KEY),
                ),
        )
}

/// Render a results view for the terminal.
fn render(view: &ResultsView) -> String {
    let (question, summary) = match (&view.question, &view.summary) {
        (Some(question), Some(summary)) => (question, summary),
        _ => return "No active question.".to_string(),
    };
    let mut out = format!("[{}] {}\n", question.domain, question.text);
    for option in &summary.options {
        out += &format!("  {}: {}", option.option, option.display);
        if summary.total > 0 {
            out += &format!(" ({}, average {:.2})", option.usefulness, option.average);
        }
        out += "\n";
    }
    out += &format!(
        "{} response{}",
        summary.total,
        if summary.total != 1 { "s" } else { "" }
    );
    out
}

/// How a vote ended.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Submitted(String),
    AlreadyAnswered(String),
}

/// Follow the pointer until a question is live, then answer it.
async fn vote(
    participant: &mut Participant,
    pointers: &mut DocumentSnapshots,
    ratings: &[Rating],
) -> Result<Outcome, String> {
    let mut waiting = false;
    while participant.next(pointers).await {
        let question = match participant.state() {
            SessionState::NoActiveQuestion => {
                if !waiting {
                    println!("Waiting for a question to go live...");
                    waiting = true;
                }
                continue;
            }
            SessionState::Answered { question } => {
                return Ok(Outcome::AlreadyAnswered(question.text.clone()))
            }
            SessionState::Unanswered { question, .. } => question.clone(),
        };
        if ratings.len() != question.options.len() {
            return Err(format!(
                "\"{}\" has {} options ({}), but {} ratings were given",
                question.text,
                question.options.len(),
                question.options.join(", "),
                ratings.len()
            ));
        }
        for (option, rating) in ratings.iter().enumerate() {
            participant
                .set_rating(option, *rating)
                .map_err(|e| e.to_string())?;
        }
        return match participant.submit().await {
            Ok(()) => Ok(Outcome::Submitted(question.text.clone())),
            Err(SubmitError::Store(e)) => Err(format!("Failed to submit response: {e}")),
            Err(e) => Err(e.to_string()),
        };
    }
    Err("The poll subscription ended".to_string())
}

async fn connect(args: &ArgMatches) -> Result<Store, String> {
    // Both have defaults.
    let db_uri: &String = args.get_one(DB_URI).ok_or("Missing --db-uri")?;
    let database: &String = args.get_one(DATABASE).ok_or("Missing --database")?;
    let store = MongoStore::connect(db_uri, database)
        .await
        .map_err(|e| format!("Failed to connect to database: {e}"))?;
    Ok(Arc::new(store))
}

async fn run_results(store: Store) -> Result<(), String> {
    let mut views = watch_results(store)
        .await
        .map_err(|e| format!("Failed to follow results: {e}"))?;
    while let Some(view) = views.next().await {
        println!("{}\n", render(&view));
    }
    Ok(())
}

async fn run_vote(store: Store, args: &ArgMatches) -> Result<(), String> {
    let ratings = args
        .get_many::<u8>(RATINGS)
        .ok_or("Missing --ratings")?
        .map(|rating| Rating::try_from(*rating).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let path: &PathBuf = args.get_one(CLIENT_ID_FILE).ok_or("Missing --client-id-file")?;
    let client_id = ClientId::load_or_create(path)
        .map_err(|e| format!("Failed to load client ID: {e}"))?;

    let mut participant = Participant::new(store, client_id);
    let mut pointers = participant
        .watch()
        .await
        .map_err(|e| format!("Failed to follow the poll: {e}"))?;
    match vote(&mut participant, &mut pointers, &ratings).await? {
        Outcome::Submitted(text) => println!("Response to \"{text}\" submitted."),
        Outcome::AlreadyAnswered(text) => println!("You have already responded to \"{text}\"."),
    }
    Ok(())
}

/// Run the requested command and return the exit code.
async fn run(args: &ArgMatches) -> u8 {
    let result = match connect(args).await {
        Ok(store) => match args.subcommand() {
            Some((RESULTS, _)) => run_results(store).await,
            Some((VOTE, vote_args)) => run_vote(store, vote_args).await,
            _ => Err("Unknown command".to_string()),
        },
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => 0,
        Err(msg) => {
            println!("{msg}");
            1
        }
    }
}

#[rocket::main]
async fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args).await;
    std::process::exit(exit_code.into())
}
