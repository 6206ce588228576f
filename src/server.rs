//! MCP server exposing search, ingest and crawl control as tools.

use crate::engine::Engine;
use crate::tools::{
    AddPackagesRequest, ListDueRequest, PackageRequest, PushAuthorRequest, PushDocumentRequest,
    SearchRequest, ViewPackageRequest, handle_add_packages, handle_crawler_stats,
    handle_database_stats, handle_list_due, handle_process_pending, handle_push_author,
    handle_push_document, handle_report_invalid, handle_search, handle_touch, handle_view_package,
};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars::{self, JsonSchema, generate::SchemaSettings},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

/// MCP server over one [`Engine`].
#[derive(Clone)]
pub struct SearchServer {
    engine: Arc<Engine>,

    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for SearchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchServer")
            .field("engine", &self.engine)
            .finish()
    }
}

fn tool_error(e: &anyhow::Error) -> String {
    format!("{:#}", e)
}

#[tool_router]
impl SearchServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    pub const fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    #[tool(
        description = "Full-text search over indexed packages. Every query word must match (words are stemmed). Results are ranked by import-graph authority, query match and stars; sub-packages are folded under their parent.",
        input_schema = inline_schema_for_type::<SearchRequest>()
    )]
    async fn search(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> std::result::Result<String, String> {
        handle_search(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "Show an indexed package (synopsis, stars, score, imports and importers), or when it is scheduled to be crawled if it is not indexed yet.",
        input_schema = inline_schema_for_type::<ViewPackageRequest>()
    )]
    async fn view_package(
        &self,
        Parameters(request): Parameters<ViewPackageRequest>,
    ) -> std::result::Result<String, String> {
        handle_view_package(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "Schedule packages for crawling. Already scheduled and malformed import paths are ignored.",
        input_schema = inline_schema_for_type::<AddPackagesRequest>()
    )]
    async fn add_packages(
        &self,
        Parameters(request): Parameters<AddPackagesRequest>,
    ) -> std::result::Result<String, String> {
        handle_add_packages(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "List due entries of the package or author frontier, most overdue first. Listed ids are handed out once, so concurrent workers get disjoint batches.",
        input_schema = inline_schema_for_type::<ListDueRequest>()
    )]
    async fn list_due(
        &self,
        Parameters(request): Parameters<ListDueRequest>,
    ) -> std::result::Result<String, String> {
        handle_list_due(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "Ingest fetched package metadata without re-fetching it. The package is queued for indexing, its author, imports and references are scheduled, and the package is rescheduled.",
        input_schema = inline_schema_for_type::<PushDocumentRequest>()
    )]
    async fn push_document(
        &self,
        Parameters(request): Parameters<PushDocumentRequest>,
    ) -> std::result::Result<String, String> {
        handle_push_document(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "Ingest the project list of an author account and reschedule the author. Reports whether any project was new.",
        input_schema = inline_schema_for_type::<PushAuthorRequest>()
    )]
    async fn push_author(
        &self,
        Parameters(request): Parameters<PushAuthorRequest>,
    ) -> std::result::Result<String, String> {
        handle_push_author(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "Remove a package that no longer exists from the crawl schedule, the document store and both indexes.",
        input_schema = inline_schema_for_type::<PackageRequest>()
    )]
    async fn report_invalid(
        &self,
        Parameters(request): Parameters<PackageRequest>,
    ) -> std::result::Result<String, String> {
        handle_report_invalid(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "Request an early crawl of a package. Tells whether it is already due (crawl it now) or was moved up in the schedule.",
        input_schema = inline_schema_for_type::<PackageRequest>()
    )]
    async fn touch(
        &self,
        Parameters(request): Parameters<PackageRequest>,
    ) -> std::result::Result<String, String> {
        handle_touch(&self.engine, request)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(
        description = "Index pushed documents and refresh documents whose importers changed, without waiting for the background worker."
    )]
    async fn process_pending(&self) -> std::result::Result<String, String> {
        handle_process_pending(&self.engine)
            .await
            .map_err(|e| tool_error(&e))
    }

    #[tool(description = "Crawl frontier sizes: total and due entries, per frontier and per host.")]
    async fn crawler_stats(&self) -> std::result::Result<String, String> {
        Ok(handle_crawler_stats(&self.engine).await)
    }

    #[tool(description = "Record counts of every stored collection.")]
    async fn database_stats(&self) -> std::result::Result<String, String> {
        Ok(handle_database_stats(&self.engine).await)
    }
}

#[tool_handler]
impl ServerHandler for SearchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_protocol_version(ProtocolVersion::V_2024_11_05)
            .with_server_info(Implementation::from_build_env())
            .with_instructions(
                "pkgsearch: package search over a crawled import graph. \
                 Use search to find packages and view_package for details. \
                 Companion crawlers feed metadata with push_document and push_author, \
                 pick work with list_due and evict dead packages with report_invalid.",
            )
    }
}

/// Generate an inline JSON schema for MCP tools
///
/// Unlike rmcp's default `schema_for_type()`, this function sets `inline_subschemas = true`
/// to generate inline enum definitions instead of $ref patterns. This ensures MCP Inspector
/// displays enums as dropdown widgets rather than raw JSON input fields.
pub fn inline_schema_for_type<T: JsonSchema>() -> Arc<JsonObject> {
    let mut settings = SchemaSettings::draft07();
    settings.transforms = vec![Box::new(schemars::transform::AddNullable::default())];
    settings.inline_subschemas = true;

    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let object = serde_json::to_value(schema).unwrap_or_default();

    let json_object = match object {
        serde_json::Value::Object(object) => object,
        _ => JsonObject::default(),
    };

    Arc::new(json_object)
}
