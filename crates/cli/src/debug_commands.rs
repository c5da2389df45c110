use {anyhow::Result, clap::Subcommand, replywatch_config::ReplywatchConfig};

use crate::app;

#[derive(Subcommand)]
pub enum DebugAction {
    /// Newest inbound activities.
    LastIncomings {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=365))]
        days: u32,
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=500))]
        limit: u64,
    },
    /// Inbound activity counts per PROVIDER_ID / PROVIDER_TYPE_ID.
    ProvidersSummary {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=365))]
        days: u32,
        #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(100..=10_000))]
        limit: u64,
    },
    /// Every activity on one CRM record.
    ActivitiesByEntity {
        /// 1 lead, 2 contact, 3 company, 4 deal.
        #[arg(long)]
        owner_type_id: i64,
        #[arg(long)]
        owner_id: i64,
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=365))]
        days: u32,
        #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u64).range(1..=1000))]
        limit: u64,
    },
}

pub async fn handle_debug(action: DebugAction, config: &ReplywatchConfig) -> Result<()> {
    let inspector = app::build_inspector(config)?;

    let output = match action {
        DebugAction::LastIncomings { days, limit } => {
            let rows = inspector.last_incomings(days, limit as usize).await?;
            serde_json::to_string_pretty(&rows)?
        },
        DebugAction::ProvidersSummary { days, limit } => {
            let summary = inspector.providers_summary(days, limit as usize).await?;
            serde_json::to_string_pretty(&summary)?
        },
        DebugAction::ActivitiesByEntity {
            owner_type_id,
            owner_id,
            days,
            limit,
        } => {
            let rows = inspector
                .activities_by_entity(owner_type_id, owner_id, days, limit as usize)
                .await?;
            serde_json::to_string_pretty(&rows)?
        },
    };

    println!("{output}");
    Ok(())
}
