use serde::de::DeserializeOwned;
use warp::Filter;

use crate::controllers::QuizController;

/// Largest accepted JSON body; deck uploads dominate.
const BODY_LIMIT: u64 = 4 * 1024 * 1024;

pub fn with_controller(
    controller: QuizController,
) -> impl Filter<Extract = (QuizController,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || controller.clone())
}

pub fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}
