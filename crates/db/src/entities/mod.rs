//! Database entities.

pub mod post;
pub mod post_like;
pub mod user;

pub use post::Entity as Post;
pub use post_like::Entity as PostLike;
pub use user::Entity as User;
