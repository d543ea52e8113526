use crate::commands::Store;
use actix_web::{
    body::BoxBody, error, web, App, Error, HttpRequest, HttpResponse, HttpServer, Responder,
};
use crowdfund::{store::UserRecord, utils::parse_address};
use log::info;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiResult<T = ()> {
    pub code: i32,
    pub msg: Option<Cow<'static, str>>,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResult<T> {
    pub fn new() -> Self {
        Self {
            code: 200,
            msg: None,
            data: None,
        }
    }
    pub fn code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }
    pub fn with_msg<S: Into<Cow<'static, str>>>(mut self, msg: S) -> Self {
        self.msg = Some(msg.into());
        self
    }
    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }
    pub fn log_to_resp(&self, req: &HttpRequest) -> HttpResponse {
        self.log(req);
        self.to_resp()
    }
    pub fn log(&self, req: &HttpRequest) {
        let peer = req
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!("{} \"{} {} {:?}\" {}", peer, req.method(), req.uri(), req.version(), self.code);
    }
    pub fn to_resp(&self) -> HttpResponse {
        match serde_json::to_string(self) {
            Ok(json) => HttpResponse::Ok().content_type("application/json").body(json),
            Err(e) => Error::from(e).into(),
        }
    }
}

impl<T: Serialize> Responder for ApiResult<T> {
    type Body = BoxBody;

    fn respond_to(self, req: &HttpRequest) -> HttpResponse {
        self.log_to_resp(req)
    }
}

// return 200 all
pub fn json_error_handler<E: std::fmt::Display + std::fmt::Debug + 'static>(err: E, req: &HttpRequest) -> error::Error {
    let detail = err.to_string();
    let api = ApiResult::new().with_data(()).code(400).with_msg(detail);
    let response = api.log_to_resp(req);

    error::InternalError::from_response(err, response).into()
}

pub async fn notfound(req: HttpRequest) -> Result<HttpResponse, Error> {
    let api = ApiResult::new().with_data(()).code(404).with_msg("route not found");

    Ok(api.respond_to(&req))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CampaignTotal {
    campaign_id: String,
    total: String,
}

fn bad_address<T: Serialize>(address: &str) -> ApiResult<T> {
    ApiResult::new().code(400).with_msg(format!("invalid address {}", address))
}

async fn user_record(store: web::Data<Store>, path: web::Path<String>) -> ApiResult<UserRecord> {
    let address = path.into_inner();
    if parse_address(&address).is_err() {
        return bad_address(&address);
    }
    match store.try_read(&address) {
        Ok(record) => ApiResult::new().with_data(record),
        Err(e) => ApiResult::new().code(500).with_msg(e.to_string()),
    }
}

async fn user_campaigns(store: web::Data<Store>, path: web::Path<String>) -> ApiResult<Vec<String>> {
    let address = path.into_inner();
    if parse_address(&address).is_err() {
        return bad_address(&address);
    }
    let mut ids: Vec<String> = store.contributed_campaign_ids(&address).into_iter().collect();
    ids.sort_by_key(|id| (id.parse::<u64>().unwrap_or(u64::MAX), id.clone()));
    ApiResult::new().with_data(ids)
}

async fn user_campaign_total(store: web::Data<Store>, path: web::Path<(String, u64)>) -> ApiResult<CampaignTotal> {
    let (address, campaign_id) = path.into_inner();
    if parse_address(&address).is_err() {
        return bad_address(&address);
    }
    let campaign_id = campaign_id.to_string();
    let total = store.total_contribution(&address, &campaign_id);
    ApiResult::new().with_data(CampaignTotal { campaign_id, total })
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PathConfig::default().error_handler(json_error_handler))
        .route("/users/{address}", web::get().to(user_record))
        .route("/users/{address}/campaigns", web::get().to(user_campaigns))
        .route("/users/{address}/campaigns/{id}/total", web::get().to(user_campaign_total))
        .default_service(web::route().to(notfound));
}

/// Serves the local records read-only until interrupted.
pub fn serve(listen: &str, store: Store) -> anyhow::Result<()> {
    let data = web::Data::new(store);
    info!("http api listening on {}", listen);
    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
            .bind(listen)?
            .run()
            .await
    })?;
    Ok(())
}
