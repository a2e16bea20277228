#[tokio::main]
async fn main() {
    if let Err(e) = pae_bin::run().await {
        eprintln!("paed: {:#}", e);
        std::process::exit(1);
    }
}
