use crate::cli::InspectArgs;
use crate::error::Result;
use eloop::core::io::checkpoint::{CheckpointBlock, CheckpointReader};
use eloop::core::series::SeriesTag;
use tracing::info;

pub async fn run(args: InspectArgs) -> Result<()> {
    info!(path = %args.path.display(), encoding = %args.encoding, "Scanning checkpoint.");

    let blocks = match &args.tag {
        Some(tag) => CheckpointReader::read_tag(&args.path, args.encoding, &SeriesTag::new(tag.as_str()))?,
        None => CheckpointReader::read_all(&args.path, args.encoding)?,
    };

    if blocks.is_empty() {
        println!("No blocks found in {}.", args.path.display());
        return Ok(());
    }

    println!("{:>5}  {:<16} {:>8}  {}", "BLOCK", "TAG", "COUNT", "RANGE");
    for (i, block) in blocks.iter().enumerate() {
        println!("{}", format_block(i, block));
    }
    println!(
        "{} block(s), {} record(s) in {}",
        blocks.len(),
        blocks.iter().map(CheckpointBlock::count).sum::<usize>(),
        args.path.display()
    );
    Ok(())
}

fn format_block(index: usize, block: &CheckpointBlock) -> String {
    let range = match block.coordinate_range() {
        Some((first, last)) => format!("[{first}, {last}]"),
        None => "(empty)".to_string(),
    };
    format!(
        "{:>5}  {:<16} {:>8}  {}",
        index,
        block.tag.as_str(),
        block.count(),
        range
    )
}
