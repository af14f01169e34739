//! Business logic services.

#![allow(missing_docs)]

pub mod auth;
pub mod auth_gate;
pub mod cursor;
pub mod feed;
mod lenient;
pub mod token;

pub use auth::{AuthService, AuthSession, LoginInput, RegisterInput};
pub use auth_gate::{AuthGate, UserIdentity};
pub use cursor::CursorCodec;
pub use feed::{
    CreatePostInput, FeedPage, FeedPost, FeedService, LikeResult, ListPostsInput, UserSummary,
};
pub use token::{Claims, JwtTokens, TokenVerifier, TokenVerifierRef};
