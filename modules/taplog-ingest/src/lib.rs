pub mod feed;
pub mod parse;
pub mod poll;
pub mod post;
pub mod tracker;
