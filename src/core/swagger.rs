use anyhow::Result;
use utoipa::openapi::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

pub fn create_swagger_ui(openapi: OpenApi) -> Result<SwaggerUi> {
    Ok(SwaggerUi::new("/swagger-ui").url(OPENAPI_JSON_PATH, openapi))
}
