//! Token signing and password digest adapters.

mod argon2_hasher;
mod jwt_codec;

pub use argon2_hasher::Argon2PasswordHasher;
pub use jwt_codec::{JwtTokenCodec, MIN_SECRET_LEN};
