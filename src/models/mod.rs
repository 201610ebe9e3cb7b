mod feed;
mod post;
mod user;

pub use feed::{Feed, FeedFollow, FeedListing};
pub use post::{InsertOutcome, NewPost, Post};
pub use user::User;
