//! Fixtures shared by unit tests.

use axum::Router;
use serde_json::{json, Value};

use crate::catalog::{Character, CharacterStatus};

pub(crate) fn character_json(id: u32, name: &str, status: &str) -> Value {
  json!({
    "id": id,
    "name": name,
    "status": status,
    "species": "Human",
    "type": "",
    "gender": "Male",
    "origin": {"name": "Earth (C-137)", "url": "https://rickandmortyapi.com/api/location/1"},
    "location": {"name": "Citadel of Ricks", "url": "https://rickandmortyapi.com/api/location/3"},
    "image": format!("https://rickandmortyapi.com/api/character/avatar/{}.jpeg", id),
    "episode": [
      "https://rickandmortyapi.com/api/episode/1",
      "https://rickandmortyapi.com/api/episode/3"
    ],
    "url": format!("https://rickandmortyapi.com/api/character/{}", id),
    "created": "2017-11-04T18:48:46.250Z"
  })
}

pub(crate) fn character(id: u32, name: &str, status: CharacterStatus) -> Character {
  serde_json::from_value(character_json(id, name, status.as_str())).unwrap()
}

pub(crate) fn episode_json(id: u32) -> Value {
  json!({
    "id": id,
    "name": format!("Episode {}", id),
    "air_date": "December 2, 2013",
    "episode": format!("S01E{:02}", id),
    "characters": ["https://rickandmortyapi.com/api/character/1"],
    "url": format!("https://rickandmortyapi.com/api/episode/{}", id),
    "created": "2017-11-10T12:56:33.798Z"
  })
}

/// Serve `router` on an ephemeral local port and return its base url.
pub(crate) async fn serve(router: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, router).await.unwrap();
  });
  format!("http://{}", addr)
}
