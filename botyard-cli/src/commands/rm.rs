use botyard::{ContainersRepository, OwnerKey};
use clap::Args;

use crate::cli::GlobalFlags;

/// Soft-delete the record for an owner key. Running containers must be
/// stopped first.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Bot id
    #[arg(long)]
    pub bot: i64,

    /// Project id
    #[arg(long)]
    pub project: i64,

    /// Owning user id
    #[arg(long)]
    pub user: i64,
}

pub async fn execute(args: RmArgs, global: &GlobalFlags) -> anyhow::Result<()> {
    let settings = global.load_settings()?;
    let repo = global.open_repository(&settings)?;

    let owner = OwnerKey::new(args.bot, args.project, args.user);
    repo.delete_by_owner_key(&owner).await?;
    println!("{}", owner);
    Ok(())
}
