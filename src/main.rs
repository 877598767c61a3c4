use anyhow::{Error, Result};
use chrono::{Duration, Utc};
use rand::prelude::*;
use ring::{digest, hmac};
use serde::{Deserialize, Serialize};
use std::{env, net::SocketAddr, sync::Arc};
use tokio::fs;
use warp::{
    http::{self, Response},
    reply::{self, Reply},
    Filter,
};

use controllers::{QuestionView, QuizController, RunWriter, SessionStatus};
use error::QuizError;
use models::Config;
use normalize::RawCardRecord;
use store::FileStore;

mod codec;
mod controllers;
mod error;
mod filters;
mod models;
mod normalize;
mod results;
mod session;
mod shuffle;
mod store;

#[derive(Clone, Debug, Deserialize, Serialize)]
struct StartRequest {
    count: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct AnswerRequest {
    selected: Vec<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct NavigateRequest {
    index: usize,
}

#[derive(Clone, Debug, Serialize)]
struct DeckReply {
    loaded: usize,
}

#[derive(Clone, Debug, Serialize)]
struct QuizStateReply {
    status: SessionStatus,
    question: Option<QuestionView>,
}

#[derive(Clone, Debug, Serialize)]
struct FlagReply {
    flagged: bool,
}

#[derive(Clone, Debug, Serialize)]
struct ErrorReply {
    error: ErrorCode,
    message: String,
}

#[derive(Clone, Copy, Debug, Serialize)]
enum ErrorCode {
    BadDeck,
    EmptyPool,
    InvalidCount,
    IndexOutOfRange,
    NotCompleted,
    Internal,
}

fn error_reply(err: &QuizError) -> warp::reply::Response {
    use QuizError::*;
    let (status, code) = match err {
        MalformedAnswerSpec(_) | InvalidQuestion(_) => {
            (http::StatusCode::BAD_REQUEST, ErrorCode::BadDeck)
        }
        EmptyPool => (http::StatusCode::CONFLICT, ErrorCode::EmptyPool),
        InvalidCount(_) => (http::StatusCode::BAD_REQUEST, ErrorCode::InvalidCount),
        IndexOutOfRange { .. } => (http::StatusCode::BAD_REQUEST, ErrorCode::IndexOutOfRange),
        SessionNotCompleted => (http::StatusCode::CONFLICT, ErrorCode::NotCompleted),
        CorruptSnapshot(_) | Io(_) => {
            (http::StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal)
        }
    };

    reply::with_status(
        reply::json(&ErrorReply {
            error: code,
            message: err.to_string(),
        }),
        status,
    )
    .into_response()
}

fn json_or_error<T: Serialize>(result: error::Result<T>) -> warp::reply::Response {
    match result {
        Ok(value) => reply::json(&value).into_response(),
        Err(err) => error_reply(&err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let bind_addr = env::var("BIND").unwrap_or_else(|_err| "127.0.0.1:3030".into());
    let bind_addr: SocketAddr = bind_addr.parse()?;

    let cors_origin = env::var("CORS_ORIGIN").unwrap_or_else(|_err| "http://localhost:1313".into());

    let secret_key = env::var("SECRET_KEY")
        .map_err(|err| Error::new(err))
        .and_then(|env| {
            let mut secret_key = [0u8; digest::SHA256_OUTPUT_LEN];
            hex::decode_to_slice(env, &mut secret_key)?;
            Ok(secret_key)
        })
        .or_else(|_err| -> Result<_> {
            let mut secret_key = [0u8; digest::SHA256_OUTPUT_LEN];
            rand::rngs::OsRng.fill(&mut secret_key);

            log::info!("no secret key was specified, generated a new one");
            log::info!("rerun with SECRET_KEY={} to keep snapshots readable", hex::encode(secret_key));

            Ok(secret_key)
        })?;

    let secret_key = hmac::Key::new(hmac::HMAC_SHA256, secret_key.as_ref());

    let config = match fs::read_to_string("quiz.toml").await {
        Ok(raw) => toml::de::from_str(&raw)?,
        Err(_err) => {
            log::info!("no quiz.toml found, using defaults");
            Config::default()
        }
    };

    let store = FileStore::new(&config.state, secret_key);
    let run_writer = match RunWriter::new(&config.results) {
        Ok(writer) => Some(writer),
        Err(err) => {
            log::warn!("run history disabled: {}", err);
            None
        }
    };

    let controller = QuizController::new(
        Arc::new(store),
        run_writer,
        Duration::seconds(config.seconds_per_question),
    );

    match fs::read_to_string(&config.deck).await {
        Ok(raw) => {
            let records: Vec<RawCardRecord> = serde_json::from_str(&raw)?;
            match controller.load_deck(&records) {
                Ok(count) => log::info!("default deck {:?} loaded ({} cards)", config.deck, count),
                Err(err) => log::warn!("default deck {:?} rejected: {}", config.deck, err),
            }
        }
        Err(_err) => log::info!("no default deck at {:?}, waiting for an upload", config.deck),
    }

    let upload_deck = warp::path!("deck")
        .and(warp::post())
        .and(filters::json_body())
        .and(filters::with_controller(controller.clone()))
        .map(|records: Vec<RawCardRecord>, controller: QuizController| {
            json_or_error(
                controller
                    .load_deck(&records)
                    .map(|loaded| DeckReply { loaded }),
            )
        });

    let get_quiz = warp::path!("quiz")
        .and(warp::get())
        .and(filters::with_controller(controller.clone()))
        .map(|controller: QuizController| {
            json_or_error(
                controller
                    .overview(Utc::now())
                    .map(|(status, question)| QuizStateReply { status, question }),
            )
        });

    let start_quiz = warp::path!("quiz" / "start")
        .and(warp::post())
        .and(filters::json_body())
        .and(filters::with_controller(controller.clone()))
        .map(|body: StartRequest, controller: QuizController| {
            json_or_error(controller.start_quiz(body.count, Utc::now()))
        });

    let submit_answer = warp::path!("quiz" / "answer")
        .and(warp::post())
        .and(filters::json_body())
        .and(filters::with_controller(controller.clone()))
        .map(|body: AnswerRequest, controller: QuizController| {
            json_or_error(controller.submit_answer(body.selected, Utc::now()))
        });

    let navigate = warp::path!("quiz" / "navigate")
        .and(warp::post())
        .and(filters::json_body())
        .and(filters::with_controller(controller.clone()))
        .map(|body: NavigateRequest, controller: QuizController| {
            json_or_error(controller.navigate(body.index, Utc::now()))
        });

    let toggle_flag = warp::path!("quiz" / "flag")
        .and(warp::post())
        .and(filters::with_controller(controller.clone()))
        .map(|controller: QuizController| {
            json_or_error(
                controller
                    .toggle_flag(Utc::now())
                    .map(|flagged| FlagReply { flagged }),
            )
        });

    let force_complete = warp::path!("quiz" / "complete")
        .and(warp::post())
        .and(filters::with_controller(controller.clone()))
        .map(|controller: QuizController| json_or_error(controller.force_complete(Utc::now())));

    let retake = warp::path!("quiz" / "retake")
        .and(warp::post())
        .and(filters::with_controller(controller.clone()))
        .map(|controller: QuizController| json_or_error(controller.retake(Utc::now())));

    let reset = warp::path!("quiz" / "reset")
        .and(warp::post())
        .and(filters::with_controller(controller.clone()))
        .map(|controller: QuizController| json_or_error(controller.reset()));

    let get_results = warp::path!("quiz" / "results")
        .and(warp::get())
        .and(filters::with_controller(controller.clone()))
        .map(|controller: QuizController| json_or_error(controller.results(Utc::now())));

    let script = warp::path!("static" / "script.js")
        .and(warp::get())
        .map(|| {
            const SCRIPT: &str = include_str!("script.js");
            Response::builder()
                .header("Content-Type", "application/javascript")
                .body(SCRIPT)
        })
        .with(warp::compression::gzip());

    let cors = warp::cors()
        .allow_origin(cors_origin.as_str())
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["Authorization", "Content-Type"]);

    let server = upload_deck
        .or(get_quiz)
        .or(start_quiz)
        .or(submit_answer)
        .or(navigate)
        .or(toggle_flag)
        .or(force_complete)
        .or(retake)
        .or(reset)
        .or(get_results)
        .or(script)
        .with(cors);

    log::info!("listening on {}", bind_addr);
    warp::serve(server).run(bind_addr).await;

    Ok(())
}
