use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ordering::{MemberSelection, NewMember, OrderedAssociation, RelationConfig};
use shared::domain::{MemberId, ParentId, PivotAttributes, PivotRow};
use storage::Storage;

/// Inspect and edit one sortable relation directly in its database.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/relations.db")]
    database_url: String,
    #[arg(long)]
    parent_type: String,
    #[arg(long)]
    relation: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        parent_id: i64,
    },
    Attach {
        parent_id: i64,
        #[arg(required = true)]
        member_ids: Vec<i64>,
        /// JSON object stored on every new pivot row.
        #[arg(long)]
        attributes: Option<String>,
    },
    Reorder {
        parent_id: i64,
        member_id: i64,
        position: u32,
    },
    Detach {
        parent_id: i64,
        #[arg(required = true)]
        member_ids: Vec<i64>,
    },
    /// Verifies order contiguity for one parent, or for every parent with members.
    Check {
        parent_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let config = RelationConfig::new(&cli.parent_type, &cli.relation)?;
    let association = OrderedAssociation::new(config, storage.clone());

    match cli.command {
        Command::List { parent_id } => {
            let rows = association.ordered_members(ParentId(parent_id)).await?;
            print_rows(&rows);
        }
        Command::Attach {
            parent_id,
            member_ids,
            attributes,
        } => {
            let attributes: PivotAttributes = match attributes {
                Some(raw) => {
                    serde_json::from_str(&raw).context("--attributes must be a JSON object")?
                }
                None => PivotAttributes::new(),
            };
            let selection = MemberSelection::Ordered(
                member_ids
                    .into_iter()
                    .map(|id| NewMember::new(MemberId(id)))
                    .collect(),
            );
            let attached = association
                .attach(ParentId(parent_id), selection, &attributes)
                .await?;
            println!("attached {} member(s)", attached.len());
            print_rows(&attached);
        }
        Command::Reorder {
            parent_id,
            member_id,
            position,
        } => {
            let outcome = association
                .reorder(ParentId(parent_id), MemberId(member_id), position)
                .await?;
            if outcome.is_noop() {
                println!("member {member_id} already at {position}");
            } else {
                println!(
                    "moved member {member_id} from {} to {}, shifted {}",
                    outcome.from,
                    outcome.to,
                    outcome.shifted.len()
                );
            }
        }
        Command::Detach {
            parent_id,
            member_ids,
        } => {
            let ids: Vec<MemberId> = member_ids.into_iter().map(MemberId).collect();
            let outcomes = association.detach(ParentId(parent_id), &ids).await?;
            for outcome in outcomes {
                println!(
                    "detached member {} from {}, shifted {}",
                    outcome.removed.member_id,
                    outcome.removed.sort_order,
                    outcome.shifted.len()
                );
            }
        }
        Command::Check { parent_id } => {
            let parents = match parent_id {
                Some(id) => vec![ParentId(id)],
                None => {
                    storage
                        .parents_with_members(&cli.parent_type, &cli.relation)
                        .await?
                }
            };
            let mut broken = 0;
            for parent in &parents {
                match association.verify(*parent).await {
                    Ok(()) => println!("{parent}: ok"),
                    Err(error) => {
                        broken += 1;
                        println!("{parent}: {error}");
                    }
                }
            }
            if broken > 0 {
                bail!("{broken} of {} scope(s) are not contiguous", parents.len());
            }
        }
    }

    Ok(())
}

fn print_rows(rows: &[PivotRow]) {
    for row in rows {
        println!(
            "{}\t{}\t{}",
            row.sort_order,
            row.member_id,
            serde_json::Value::Object(row.attributes.clone())
        );
    }
}
