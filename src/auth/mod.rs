use axum::{Router, routing::{get, post}};
use rand::seq::IndexedRandom;

use crate::AppState;

mod login;
mod logout;

pub use login::login_page_html;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page).post(login::login))
        .route("/logout", post(logout::logout))
}

const ADJECTIVES: &[&str] = &[
    "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
    "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
    "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
];

const NOUNS: &[&str] = &[
    "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
    "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
    "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
];

/// Display name for users who sign in without picking one.
pub(crate) fn random_alias() -> String {
    let mut rng = rand::rng();
    format!(
        "{} {}",
        ADJECTIVES.choose(&mut rng).copied().unwrap_or("Nameless"),
        NOUNS.choose(&mut rng).copied().unwrap_or("User"),
    )
}
