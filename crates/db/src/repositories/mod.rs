//! Storage for users, posts and likes.

pub mod memory;
pub mod post;
pub mod user;

pub use memory::{MemoryPostStore, MemoryUserStore};
pub use post::{LikeOutcome, NewPost, PostRecord, PostRepository, PostStore, PostStoreRef};
pub use user::{NewUser, UserRepository, UserStore, UserStoreRef};
