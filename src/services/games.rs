// src/services/games.rs

//! Game discovery and box-score extraction.
//!
//! The listing page for a day links every finished game with an element
//! carrying `data-text="BOX SCORE"`. Each game page embeds its data as JSON
//! in the `__NEXT_DATA__` script block.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Game, ScraperConfig};
use crate::utils::http;
use crate::utils::resolve;

/// Marker attribute value of box-score links on the listing page.
pub const BOX_SCORE_LABEL: &str = "BOX SCORE";

/// Element id of the embedded page data.
pub const NEXT_DATA_ID: &str = "__NEXT_DATA__";

/// JSON path from the page data to the game record.
const GAME_PATH: [&str; 3] = ["props", "pageProps", "game"];

/// Source of game references and game records.
#[async_trait]
pub trait GameSource: Send + Sync {
    /// References of every game played on `date` (`YYYY-MM-DD`), page order.
    async fn list_games(&self, date: &str) -> Result<Vec<String>>;

    /// Fetch and parse one game.
    async fn fetch_game(&self, reference: &str) -> Result<Game>;
}

/// [`GameSource`] backed by the public NBA website.
pub struct NbaClient {
    client: Client,
    base_url: String,
}

impl NbaClient {
    /// Create a client using the scraper settings.
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Listing page URL for a day.
    pub fn listing_url(&self, date: &str) -> String {
        format!("{}/games?date={}", self.base_url, date)
    }

    /// Absolute URL of a game reference.
    pub fn game_url(&self, reference: &str) -> Result<String> {
        resolve(&self.base_url, reference)
    }
}

#[async_trait]
impl GameSource for NbaClient {
    async fn list_games(&self, date: &str) -> Result<Vec<String>> {
        let url = self.listing_url(date);
        log::info!("Fetching game listing: {}", url);

        let html = http::fetch_text(&self.client, &url).await?;
        let links = parse_box_score_links(&Html::parse_document(&html))?;

        log::info!("Found {} game(s) for {}", links.len(), date);
        Ok(links)
    }

    async fn fetch_game(&self, reference: &str) -> Result<Game> {
        let url = self.game_url(reference)?;
        log::debug!("Fetching game page: {}", url);

        let html = http::fetch_text(&self.client, &url).await?;
        extract_game(&Html::parse_document(&html))
            .map_err(|e| AppError::extract(url, e))
    }
}

/// `href` of every element marked as a box-score link, document order.
///
/// A marked element without an `href` fails the whole listing, so the
/// result always has one reference per marker.
pub fn parse_box_score_links(document: &Html) -> Result<Vec<String>> {
    let selector = parse_selector(&format!(r#"[data-text="{}"]"#, BOX_SCORE_LABEL))?;

    document
        .select(&selector)
        .map(|el| {
            el.value().attr("href").map(str::to_string).ok_or_else(|| {
                AppError::extract(
                    "BOX SCORE marker",
                    format!("missing href on {}", el.html()),
                )
            })
        })
        .collect()
}

/// Parse the embedded page data and descend to the game record.
pub fn extract_game(document: &Html) -> Result<Game> {
    let selector = parse_selector(&format!("#{}", NEXT_DATA_ID))?;
    let block = document
        .select(&selector)
        .next()
        .ok_or_else(|| AppError::extract(NEXT_DATA_ID, "element not found"))?;

    let text: String = block.text().collect();
    let data: Value = serde_json::from_str(&text)?;

    let mut node = &data;
    for (depth, key) in GAME_PATH.iter().enumerate() {
        node = node.get(key).ok_or_else(|| {
            AppError::extract(
                NEXT_DATA_ID,
                format!("missing '{}'", GAME_PATH[..=depth].join(".")),
            )
        })?;
    }

    Ok(Game::deserialize(node)?)
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="game">
            <a href="/game/bos-vs-mia-0042200301" data-text="BOX SCORE">Box Score</a>
            <a href="/game/bos-vs-mia-0042200301/play-by-play" data-text="PLAY-BY-PLAY">PBP</a>
          </div>
          <div class="game">
            <a href="/game/den-vs-lal-0042200311" data-text="BOX SCORE">Box Score</a>
          </div>
        </body></html>
    "#;

    fn game_page(game_json: &str) -> String {
        format!(
            r#"<html><head>
                <script id="__NEXT_DATA__" type="application/json">
                  {{"props":{{"pageProps":{{"game":{}}}}}}}
                </script>
              </head><body></body></html>"#,
            game_json
        )
    }

    #[test]
    fn test_parse_box_score_links() {
        let links = parse_box_score_links(&Html::parse_document(LISTING)).unwrap();
        assert_eq!(
            links,
            vec!["/game/bos-vs-mia-0042200301", "/game/den-vs-lal-0042200311"]
        );
    }

    #[test]
    fn test_parse_box_score_links_none() {
        let html = Html::parse_document("<html><body><p>No games today</p></body></html>");
        assert!(parse_box_score_links(&html).unwrap().is_empty());
    }

    #[test]
    fn test_parse_box_score_links_marker_without_href() {
        let html = Html::parse_document(
            r#"<a href="/game/1" data-text="BOX SCORE">Box Score</a>
               <span data-text="BOX SCORE">Box Score</span>"#,
        );
        let err = parse_box_score_links(&html).unwrap_err();
        assert!(matches!(err, AppError::Extract { .. }));
        assert!(err.to_string().contains("href"));
    }

    #[test]
    fn test_extract_game() {
        let page = game_page(
            r#"{
                "gameId": "0042200301",
                "homeTeam": {"teamId": 1610612738, "teamCity": "Boston", "teamName": "Celtics",
                    "players": [{"personId": 1628369, "statistics": {"points": 14}}]},
                "awayTeam": {"teamId": 1610612748, "teamCity": "Miami", "teamName": "Heat",
                    "players": []}
            }"#,
        );

        let game = extract_game(&Html::parse_document(&page)).unwrap();
        assert_eq!(game.home_team.display_name(), "Boston Celtics");
        assert_eq!(game.away_team.display_name(), "Miami Heat");
        assert_eq!(game.home_team.players.len(), 1);
    }

    #[test]
    fn test_extract_game_missing_marker() {
        let html = Html::parse_document("<html><body>maintenance</body></html>");
        let err = extract_game(&html).unwrap_err();
        assert!(matches!(err, AppError::Extract { .. }));
    }

    #[test]
    fn test_extract_game_missing_path() {
        let page = r#"<html><script id="__NEXT_DATA__">{"props":{"pageProps":{}}}</script></html>"#;
        let err = extract_game(&Html::parse_document(page)).unwrap_err();
        assert!(err.to_string().contains("props.pageProps.game"));
    }

    /// Serve fixed pages on 127.0.0.1, 404 for any other path.
    async fn serve(pages: Vec<(&'static str, String)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == &b"\r\n\r\n"[..]) {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/");

                let (status, body) = match pages.iter().find(|(p, _)| *p == path) {
                    Some((_, body)) => ("200 OK", body.clone()),
                    None => ("404 Not Found", "not found".to_string()),
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    fn local_client(base_url: String) -> NbaClient {
        NbaClient::new(&ScraperConfig {
            base_url,
            timeout_secs: 5,
            ..ScraperConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_and_fetch_over_http() {
        let game = game_page(
            r#"{"homeTeam": {"teamId": 1, "teamCity": "Boston", "teamName": "Celtics", "players": []},
                "awayTeam": {"teamId": 2, "teamCity": "Miami", "teamName": "Heat", "players": []}}"#,
        );
        let base_url = serve(vec![
            ("/games?date=2023-03-09", LISTING.to_string()),
            ("/game/bos-vs-mia-0042200301", game),
        ])
        .await;
        let client = local_client(base_url);

        let links = client.list_games("2023-03-09").await.unwrap();
        assert_eq!(
            links,
            vec!["/game/bos-vs-mia-0042200301", "/game/den-vs-lal-0042200311"]
        );

        let game = client.fetch_game(&links[0]).await.unwrap();
        assert_eq!(game.file_name(), "Boston Celtics vs Miami Heat.csv");
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let client = local_client(serve(Vec::new()).await);

        let err = client.list_games("2023-03-09").await.unwrap_err();
        assert!(matches!(err, AppError::Http(_)));

        let err = client.fetch_game("/game/den-vs-lal-0042200311").await.unwrap_err();
        assert!(matches!(err, AppError::Http(_)));
    }

    #[test]
    fn test_urls() {
        let config = ScraperConfig {
            base_url: "https://www.nba.com/".to_string(),
            ..ScraperConfig::default()
        };
        let client = NbaClient::new(&config).unwrap();

        assert_eq!(
            client.listing_url("2023-03-09"),
            "https://www.nba.com/games?date=2023-03-09"
        );
        assert_eq!(
            client.game_url("/game/bos-vs-mia-0042200301").unwrap(),
            "https://www.nba.com/game/bos-vs-mia-0042200301"
        );
    }
}
