//! Game server API: the three requests the sync engine depends on.

use crate::error::ApiError;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{
    CellData, Coord, Direction, GetCellsRequest, GetCellsResponse, GetPlayerRequest,
    GetPlayerResponse, MoveRequest, MoveResponse, PlayerData, FIXED_BATCH_ROUTE_SIZE,
};
use std::time::Duration;

#[async_trait]
pub trait GameApi: Send + Sync {
    /// Returns one cell per requested coordinate, in request order.
    async fn fetch_cells(&self, coords: &[Coord]) -> Result<Vec<CellData>, ApiError>;

    /// A response without `my_new_coords` means the server did not apply the move.
    async fn submit_move(
        &self,
        player_id: u32,
        direction: Direction,
    ) -> Result<MoveResponse, ApiError>;

    async fn get_player(&self, player_id: u32) -> Result<PlayerData, ApiError>;
}

/// Picks the cheaper fixed-size route when the batch allows it.
pub fn cells_route(batch_len: usize) -> &'static str {
    if batch_len == FIXED_BATCH_ROUTE_SIZE {
        "get_five_cells"
    } else {
        "get_cells"
    }
}

/// JSON-over-HTTP client for the game server.
pub struct HttpGameApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGameApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route)
    }

    async fn post<Req, Resp>(&self, route: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self.http.post(self.url(route)).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn fetch_cells(&self, coords: &[Coord]) -> Result<Vec<CellData>, ApiError> {
        let route = cells_route(coords.len());
        debug!("POST /{} for {} coordinates", route, coords.len());

        let request = GetCellsRequest {
            coords: coords.to_vec(),
        };
        let response: GetCellsResponse = self.post(route, &request).await?;

        if response.cell_data.len() < coords.len() {
            return Err(ApiError::Malformed(format!(
                "expected {} cells, got {}",
                coords.len(),
                response.cell_data.len()
            )));
        }
        Ok(response.cell_data)
    }

    async fn submit_move(
        &self,
        player_id: u32,
        direction: Direction,
    ) -> Result<MoveResponse, ApiError> {
        let request = MoveRequest {
            player_id,
            direction,
        };
        self.post("move", &request).await
    }

    async fn get_player(&self, player_id: u32) -> Result<PlayerData, ApiError> {
        let response: GetPlayerResponse =
            self.post("get_player", &GetPlayerRequest { player_id }).await?;
        Ok(response.player_data)
    }
}
