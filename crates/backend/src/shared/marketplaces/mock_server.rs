//! Локальный HTTP-сервер на случайном порту для тестов клиентов

use axum::Router;
use tokio::net::TcpListener;

/// Запускает `router` и возвращает базовый URL вида `http://127.0.0.1:port`
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
