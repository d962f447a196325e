#[tokio::main]
async fn main() {
    safevoice::web::run().await;
}
