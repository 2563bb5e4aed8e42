use axum::response::Html;

pub async fn upload_page() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}
