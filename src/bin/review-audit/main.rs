#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gh_audit::cli::main_with(gh_audit::parse_review_args).await
}
