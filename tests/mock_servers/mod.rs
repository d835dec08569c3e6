//! Mock servers for integration testing
//!
//! These mock servers simulate the remote services the radio talks to,
//! allowing full integration testing without a Spotify account or device.

pub mod spotify;

pub use spotify::MockSpotifyServer;
