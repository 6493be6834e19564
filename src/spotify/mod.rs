//! Spotify Web API: search and playback.
//!
//! Searches use an app token (client credentials). Playback needs a user
//! token from the PKCE flow in [`oauth`].

pub mod oauth;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::bail;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{self, Config};
use crate::error::ActionError;
use oauth::{Authorizer, StoredTokens, TokenResponse, TokenStore};

const API_BASE: &str = "https://api.spotify.com/v1";

/// Result of a playback request that reached the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Started,
    NoDevice,
    Unauthorized,
    Rejected(u16),
}

impl Playback {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=204 => Self::Started,
            404 => Self::NoDevice,
            401 => Self::Unauthorized,
            other => Self::Rejected(other),
        }
    }
}

#[derive(Deserialize)]
struct ArtistSearch {
    artists: Page<Item>,
}

#[derive(Deserialize)]
struct TrackSearch {
    tracks: Page<Item>,
}

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct Item {
    id: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct TopTracks {
    tracks: Vec<Item>,
}

#[derive(Deserialize)]
struct CurrentlyPlaying {
    item: Option<Item>,
}

pub struct SpotifyClient {
    http: Client,
    client_id: String,
    client_secret: Option<String>,
    redirect_port: u16,
    store: TokenStore,
    /// Held while a user token is being loaded, refreshed or authorized.
    auth: Mutex<()>,
}

fn spotify_err(e: anyhow::Error) -> ActionError {
    ActionError::Spotify(format!("{e:#}"))
}

impl SpotifyClient {
    /// `None` when `SPOTIFY_API_KEY` is unset.
    pub fn from_env(config: &Config) -> Option<Self> {
        let client_id = config::secret("SPOTIFY_API_KEY")?;
        Some(Self::new(
            client_id,
            config::secret("SPOTIFY_CLIENT_SECRET"),
            config.spotify_redirect_port,
            TokenStore::new(config::spotify_tokens_path()),
        ))
    }

    pub fn new(
        client_id: String,
        client_secret: Option<String>,
        redirect_port: u16,
        store: TokenStore,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            client_id,
            client_secret,
            redirect_port,
            store,
            auth: Mutex::new(()),
        }
    }

    fn authorizer(&self) -> Authorizer<'_> {
        Authorizer {
            http: &self.http,
            client_id: &self.client_id,
            port: self.redirect_port,
        }
    }

    /// Client-credentials token for catalog searches.
    fn app_token(&self) -> anyhow::Result<String> {
        let Some(secret) = self.client_secret.as_deref() else {
            bail!("SPOTIFY_CLIENT_SECRET not set");
        };
        let resp = self
            .http
            .post(oauth::TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", secret),
            ])
            .send()?;
        if !resp.status().is_success() {
            bail!("Client credentials request failed: {}", resp.status());
        }
        let token: TokenResponse = resp.json()?;
        Ok(token.access_token)
    }

    /// Catalog token: the app token if a secret is configured, otherwise the
    /// user token.
    fn search_token(&self) -> anyhow::Result<String> {
        if self.client_secret.is_some() {
            self.app_token()
        } else {
            self.valid_access_token()
        }
    }

    /// A usable user token: stored if fresh, refreshed if possible, else a
    /// new browser authorization.
    pub fn valid_access_token(&self) -> anyhow::Result<String> {
        let _guard = self.auth.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();

        let Some(mut tokens) = self.store.load() else {
            return self.authorize_locked();
        };
        if tokens.is_fresh(now) {
            return Ok(tokens.access_token);
        }
        if let Some(refresh) = tokens.refresh_token.clone() {
            match self.authorizer().refresh(&refresh) {
                Ok(response) => {
                    debug!("Spotify token refreshed");
                    tokens.merge(response, now);
                    self.store.save(&tokens)?;
                    return Ok(tokens.access_token);
                }
                Err(e) => warn!("Spotify token refresh failed: {e:#}"),
            }
        }
        self.authorize_locked()
    }

    /// Run the browser flow and store the result.
    pub fn authorize(&self) -> anyhow::Result<String> {
        let _guard = self.auth.lock().unwrap_or_else(PoisonError::into_inner);
        self.authorize_locked()
    }

    fn authorize_locked(&self) -> anyhow::Result<String> {
        let response = self.authorizer().authorize()?;
        let tokens = StoredTokens::from_response(response, Utc::now());
        self.store.save(&tokens)?;
        info!("Spotify tokens saved to {}", self.store.path().display());
        Ok(tokens.access_token)
    }

    fn find_artist(&self, name: &str) -> anyhow::Result<Option<Item>> {
        let token = self.search_token()?;
        let result: ArtistSearch = self
            .http
            .get(format!("{API_BASE}/search"))
            .bearer_auth(token)
            .query(&[("q", name), ("type", "artist"), ("limit", "1")])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(result.artists.items.into_iter().next())
    }

    fn top_track(&self, artist_id: &str) -> anyhow::Result<Option<Item>> {
        let token = self.search_token()?;
        let result: TopTracks = self
            .http
            .get(format!("{API_BASE}/artists/{artist_id}/top-tracks"))
            .bearer_auth(token)
            .query(&[("market", "US")])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(result.tracks.into_iter().next())
    }

    fn find_track(&self, song: &str, artist: &str) -> anyhow::Result<Option<Item>> {
        let token = self.search_token()?;
        let query = format!("track:{song} artist:{artist}");
        let result: TrackSearch = self
            .http
            .get(format!("{API_BASE}/search"))
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(result.tracks.items.into_iter().next())
    }

    fn start_playback(&self, uri: &str) -> anyhow::Result<Playback> {
        let token = self.valid_access_token()?;
        let resp = self
            .http
            .put(format!("{API_BASE}/me/player/play"))
            .bearer_auth(token)
            .json(&json!({ "uris": [uri] }))
            .send()?;
        let playback = Playback::from_status(resp.status());
        debug!(?playback, uri, "playback request");
        Ok(playback)
    }

    pub fn play_artist(&self, name: &str) -> Result<Playback, ActionError> {
        let artist = self
            .find_artist(name)
            .map_err(spotify_err)?
            .ok_or_else(|| ActionError::Spotify(format!("no artist found for {name:?}")))?;
        let track = self
            .top_track(&artist.id)
            .map_err(spotify_err)?
            .ok_or_else(|| ActionError::Spotify(format!("no tracks for {}", artist.name)))?;
        info!(artist = %artist.name, track = %track.name, "spotify");
        self.start_playback(&track.uri).map_err(spotify_err)
    }

    pub fn play_track(&self, song: &str, artist: &str) -> Result<Playback, ActionError> {
        let track = self
            .find_track(song, artist)
            .map_err(spotify_err)?
            .ok_or_else(|| ActionError::Spotify(format!("no track {song:?} by {artist:?}")))?;
        info!(track = %track.name, "spotify");
        self.start_playback(&track.uri).map_err(spotify_err)
    }

    /// Restart playback with only the current track. There is no endpoint
    /// that clears the queue itself.
    pub fn clear_queue(&self) -> Result<Playback, ActionError> {
        let token = self.valid_access_token().map_err(spotify_err)?;
        let resp = self
            .http
            .get(format!("{API_BASE}/me/player/currently-playing"))
            .bearer_auth(token)
            .send()?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Err(ActionError::Spotify("nothing is playing".into()));
        }
        if !resp.status().is_success() {
            return Ok(Playback::from_status(resp.status()));
        }
        let current: CurrentlyPlaying = resp.json()?;
        let item = current
            .item
            .ok_or_else(|| ActionError::Spotify("nothing is playing".into()))?;
        self.start_playback(&item.uri).map_err(spotify_err)
    }
}
