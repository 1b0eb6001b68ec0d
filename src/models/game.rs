//! Game, team and player records parsed from a box-score page.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column added to every flattened row with the team display name.
pub const TEAM_COLUMN: &str = "team";

/// Column added to every flattened row with the team identifier.
pub const TEAM_ID_COLUMN: &str = "teamId";

/// One game, as embedded in the page under `props.pageProps.game`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub home_team: Team,
    pub away_team: Team,
}

impl Game {
    /// Output file name: `"{home} vs {away}.csv"`.
    pub fn file_name(&self) -> String {
        box_score_file_name(&self.home_team.display_name(), &self.away_team.display_name())
    }

    /// Flattened rows of both teams, home players first.
    pub fn player_records(&self) -> Vec<PlayerRecord> {
        let mut records = self.home_team.flatten();
        records.extend(self.away_team.flatten());
        records
    }
}

/// Build the output file name for a game between two teams.
pub fn box_score_file_name(home: &str, away: &str) -> String {
    format!("{home} vs {away}.csv")
}

/// A team's side of the box score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Numeric team identifier
    pub team_id: i64,

    /// City part of the display name (e.g. "Boston")
    pub team_city: String,

    /// Name part of the display name (e.g. "Celtics")
    pub team_name: String,

    /// Players in payload order
    #[serde(default)]
    pub players: Vec<Player>,
}

impl Team {
    /// Display name: `"{city} {name}"`.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.team_city, self.team_name)
    }

    /// Flatten every player into a single-level record tagged with this team.
    pub fn flatten(&self) -> Vec<PlayerRecord> {
        let name = self.display_name();
        self.players
            .iter()
            .map(|player| player.flatten(&name, self.team_id))
            .collect()
    }
}

/// A player entry: a statistics mapping plus identity fields beside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    /// Statistic name to value
    pub statistics: Map<String, Value>,

    /// Every other top-level key of the player entry (id, name, position, ...)
    #[serde(flatten)]
    pub identity: Map<String, Value>,
}

impl Player {
    /// Merge identity fields into the statistics and tag with the team.
    ///
    /// Field order is statistics, then identity, then `team` and `teamId`.
    /// A key present in both sets keeps its statistics position but takes
    /// the later value, so identity fields win over statistics and the team
    /// tags win over both.
    pub fn flatten(&self, team_name: &str, team_id: i64) -> PlayerRecord {
        let mut fields = self.statistics.clone();

        for (key, value) in &self.identity {
            if fields.contains_key(key) {
                log::warn!(
                    "Identity field '{}' overwrites a statistic of the same name ({})",
                    key,
                    team_name
                );
            }
            fields.insert(key.clone(), value.clone());
        }

        for key in [TEAM_COLUMN, TEAM_ID_COLUMN] {
            if fields.contains_key(key) {
                log::warn!("Player field '{}' replaced by team tag ({})", key, team_name);
            }
        }
        fields.insert(TEAM_COLUMN.to_string(), Value::String(team_name.to_string()));
        fields.insert(TEAM_ID_COLUMN.to_string(), Value::from(team_id));

        PlayerRecord(fields)
    }
}

/// A flattened player row, keys in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PlayerRecord(pub Map<String, Value>);

impl PlayerRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_team() -> Team {
        serde_json::from_value(json!({
            "teamId": 7,
            "teamCity": "Los",
            "teamName": "Angeles",
            "players": [
                { "statistics": { "pts": 10 }, "personId": 99 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_flatten_single_player() {
        let team = sample_team();
        assert_eq!(team.display_name(), "Los Angeles");

        let records = team.flatten();
        assert_eq!(records.len(), 1);
        assert_eq!(
            serde_json::to_value(&records[0]).unwrap(),
            json!({ "pts": 10, "personId": 99, "team": "Los Angeles", "teamId": 7 })
        );
    }

    #[test]
    fn test_flatten_key_order() {
        let player: Player = serde_json::from_value(json!({
            "personId": 1,
            "statistics": { "minutes": "PT30M", "points": 21, "assists": 4 },
            "firstName": "Jayson",
            "position": "F"
        }))
        .unwrap();

        let record = player.flatten("Boston Celtics", 1610612738);
        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(
            keys,
            vec![
                "minutes",
                "points",
                "assists",
                "personId",
                "firstName",
                "position",
                "team",
                "teamId"
            ]
        );
    }

    #[test]
    fn test_flatten_identity_overwrites_statistic() {
        let player: Player = serde_json::from_value(json!({
            "statistics": { "points": 12, "order": 3 },
            "order": 1
        }))
        .unwrap();

        let record = player.flatten("Miami Heat", 1610612748);
        assert_eq!(record.get("order"), Some(&json!(1)));
        assert_eq!(record.keys().next(), Some("points"));
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn test_game_records_home_first() {
        let game: Game = serde_json::from_value(json!({
            "gameId": "0022200001",
            "homeTeam": {
                "teamId": 1, "teamCity": "Boston", "teamName": "Celtics",
                "players": [{ "statistics": { "points": 30 }, "personId": 10 }]
            },
            "awayTeam": {
                "teamId": 2, "teamCity": "Miami", "teamName": "Heat",
                "players": [
                    { "statistics": { "points": 20 }, "personId": 20 },
                    { "statistics": { "points": 5 }, "personId": 21 }
                ]
            }
        }))
        .unwrap();

        assert_eq!(game.file_name(), "Boston Celtics vs Miami Heat.csv");

        let records = game.player_records();
        let teams: Vec<_> = records.iter().map(|r| r.get("team").unwrap()).collect();
        assert_eq!(
            teams,
            vec![&json!("Boston Celtics"), &json!("Miami Heat"), &json!("Miami Heat")]
        );
    }

    #[test]
    fn test_team_without_players() {
        let team: Team = serde_json::from_value(json!({
            "teamId": 3, "teamCity": "Utah", "teamName": "Jazz"
        }))
        .unwrap();
        assert!(team.flatten().is_empty());
    }
}
