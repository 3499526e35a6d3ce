use axum::Router;
use std::path::{Path, PathBuf};
use tower_http::services::{ServeDir, ServeFile};

/// Route -> page directory under `<static_dir>/pages`.
const PAGES: &[(&str, &str)] = &[
    ("/", "index"),
    ("/resources", "resources"),
    ("/dashboard", "dashboard"),
    ("/upload", "upload"),
    ("/settings", "settings"),
];

fn page_path(static_dir: &Path, page: &str) -> PathBuf {
    static_dir
        .join("pages")
        .join(page)
        .join(format!("{page}.html"))
}

/// Named pages plus the whole static tree as fallback.
pub(crate) fn routes<S>(router: Router<S>, static_dir: &Path) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    PAGES
        .iter()
        .fold(router, |router, (route, page)| {
            router.route_service(route, ServeFile::new(page_path(static_dir, page)))
        })
        .fallback_service(ServeDir::new(static_dir))
}
