use quarry_core::{Projections, Quarry, Session};
use quarry_study::config::StudyConfig;
use quarry_study::{MemberDto, QMember, QTeam, create_schema, fixture};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = StudyConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let pool = Quarry::sqlite_pool_with(&config.database_url, config.max_connections).await?;
    create_schema(&pool).await?;

    let session = Session::begin_with(&pool, config.session_options()).await?;
    let data = fixture::seed(&session).await?;
    tracing::info!(members = data.members.len(), "fixture ready");

    let query = session.query();
    let member = QMember::member();
    let team = QTeam::team();

    println!("Team averages:");
    let rows = query
        .select_tuple((&team.name, member.age.avg()))
        .from(&member)
        .join(&member.team, &team)
        .group_by(&team.name)
        .order_by(team.name.asc())
        .fetch()
        .await?;
    for row in &rows {
        println!("  {}", row);
    }

    println!("Members:");
    let dtos = query
        .select(Projections::constructor::<MemberDto>((&member.username, &member.age)))
        .from(&member)
        .order_by(member.age.desc())
        .fetch()
        .await?;
    println!("{}", serde_json::to_string_pretty(&dtos)?);

    tracing::info!(statements = session.statement_count().await, "study run finished");
    session.rollback().await?;
    Ok(())
}
