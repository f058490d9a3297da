use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;

use crate::core::{
    auth::AuthManager, cache::ResponseCache, gateway::Gateway, rate_limiter::TrafficShaper,
    storage::ProjectDirectory,
};
use crate::models::error::{ApiError, ErrorPolicy};

pub mod chat;
pub mod projects;
pub mod stats;

/// Long-lived services shared by every route.
#[derive(Clone)]
pub struct AppServices {
    pub gateway: Gateway,
    pub projects: Arc<dyn ProjectDirectory>,
    pub cache: ResponseCache,
    pub shaper: Arc<TrafficShaper>,
    pub auth: Arc<AuthManager>,
    pub errors: ErrorPolicy,
}

pub fn router(services: AppServices) -> Router {
    let chat_state = chat::ChatState {
        gateway: services.gateway.clone(),
        cache: services.cache.clone(),
        auth: services.auth.clone(),
        errors: services.errors,
    };

    let project_state = projects::ProjectState {
        projects: services.projects.clone(),
        cache: services.cache.clone(),
        auth: services.auth.clone(),
        errors: services.errors,
    };

    let stats_state = stats::StatsState {
        cache: services.cache.clone(),
        shaper: services.shaper.clone(),
        started_at: Instant::now(),
    };

    let chat_routes = Router::new()
        .route(
            "/api/chat/:project_id/messages",
            get(chat::list_messages)
                .post(chat::post_message)
                .delete(chat::delete_messages),
        )
        .with_state(chat_state);

    let project_routes = Router::new()
        .route(
            "/api/projects",
            post(projects::create_project).get(projects::list_projects),
        )
        .route(
            "/api/projects/:project_id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .with_state(project_state);

    let stats_routes = Router::new()
        .route("/api/health", get(stats::health))
        .route("/api/stats", get(stats::get_stats))
        .with_state(stats_state);

    Router::new()
        .merge(chat_routes)
        .merge(project_routes)
        .merge(stats_routes)
        .fallback(route_not_found)
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum_test::TestServer;

    use crate::core::completion::{CompletionProvider, MockCompletionProvider};
    use crate::core::context::ContextWindowBuilder;
    use crate::core::storage::{InMemoryProjectDirectory, InMemoryTranscriptStore};
    use crate::core::{cache::CacheConfig, rate_limiter::RateLimitConfig};
    use crate::models::project::{NewProject, Project};

    pub const SECRET: &str = "test-secret";

    pub struct TestApp {
        pub server: TestServer,
        pub services: AppServices,
        pub transcripts: Arc<InMemoryTranscriptStore>,
    }

    impl TestApp {
        pub fn new(provider: MockCompletionProvider) -> Self {
            Self::with_provider(Arc::new(provider))
        }

        pub fn with_provider(provider: Arc<dyn CompletionProvider>) -> Self {
            let transcripts = Arc::new(InMemoryTranscriptStore::new());
            let projects: Arc<dyn ProjectDirectory> = Arc::new(InMemoryProjectDirectory::new());
            let shaper = Arc::new(TrafficShaper::new(RateLimitConfig::default()));

            let gateway = Gateway::new(
                transcripts.clone(),
                projects.clone(),
                shaper.clone(),
                provider,
                ContextWindowBuilder::default(),
                100,
            );

            let services = AppServices {
                gateway,
                projects,
                cache: ResponseCache::new(CacheConfig::default()),
                shaper,
                auth: Arc::new(AuthManager::new(SECRET)),
                errors: ErrorPolicy::new(true),
            };

            let server = TestServer::new(router(services.clone())).unwrap();

            Self {
                server,
                services,
                transcripts,
            }
        }

        pub fn bearer(&self, user: &str) -> String {
            let token = self.services.auth.generate_token(user, 1).unwrap();
            format!("Bearer {token}")
        }

        pub async fn project_for(&self, owner: &str) -> Project {
            self.services
                .projects
                .create(
                    owner,
                    NewProject {
                        name: "Demo".to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
        }
    }
}
