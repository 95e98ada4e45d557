use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tmpfs_recover_core::forensics::{HashAlgorithm, VerificationStatus};
use tmpfs_recover_core::{
	list_tmpfs_superblocks, AddressSpaceConfig, Capture, KernelMountTable, MissingPagePolicy,
	RecoveryConfig, RecoveryEngine,
};

#[derive(Parser, Debug)]
#[command(
	name = "tmpfs-recover",
	version,
	about = "Recover tmpfs contents from Linux memory captures"
)]
struct Cli {
	#[command(flatten)]
	capture: CaptureArgs,

	/// Enable debug logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Args, Debug)]
struct CaptureArgs {
	/// Raw physical memory image
	#[arg(long)]
	image: PathBuf,
	/// JSON symbol table describing the captured kernel
	#[arg(long)]
	profile: PathBuf,
	/// Base of the kernel direct map
	#[arg(long, value_parser = parse_address, default_value = "0xffff880000000000")]
	page_offset: u64,
	/// Base of the kernel image mapping
	#[arg(long, value_parser = parse_address, default_value = "0xffffffff80000000")]
	kernel_map_base: u64,
	/// Physical load address of the kernel image
	#[arg(long, value_parser = parse_address, default_value = "0")]
	phys_base: u64,
	/// Address of the page descriptor array, when the profile lacks `mem_map`
	#[arg(long, value_parser = parse_address)]
	mem_map: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// List mounted tmpfs superblocks
	List,
	/// Recover the files of one tmpfs superblock
	Recover {
		/// Index printed by `list`
		#[arg(long)]
		superblock: usize,
		/// Existing directory receiving the recovered tree
		#[arg(long)]
		out: PathBuf,
		/// Write a JSON report of every entry
		#[arg(long)]
		report: Option<PathBuf>,
		/// Seconds added to recovered access and modification times
		#[arg(long, default_value = "18000", allow_hyphen_values = true)]
		skew_secs: i64,
		/// What to do with pages that are not resident in the capture
		#[arg(long, value_parser = ["zero", "abort"], default_value = "zero")]
		missing_pages: String,
		/// Skip files whose recorded size exceeds this many bytes
		#[arg(long)]
		max_file_size: Option<u64>,
		/// Skip directories nested deeper than this
		#[arg(long)]
		max_depth: Option<usize>,
		/// Compute MD5, SHA-1 and SHA-256 instead of SHA-256 only
		#[arg(long)]
		all_hashes: bool,
		/// Re-hash recovered files after writing them
		#[arg(long)]
		verify: bool,
	},
}

fn parse_address(value: &str) -> std::result::Result<u64, String> {
	let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
		Some(hex) => u64::from_str_radix(hex, 16),
		None => value.parse::<u64>(),
	};
	parsed.map_err(|e| format!("invalid address '{}': {}", value, e))
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.init();

	let address_space = AddressSpaceConfig {
		page_offset: cli.capture.page_offset,
		kernel_map_base: cli.capture.kernel_map_base,
		phys_base: cli.capture.phys_base,
	};
	let capture = Capture::open(&cli.capture.image, &cli.capture.profile, address_space)?;

	let mut config = RecoveryConfig {
		mem_map: cli.capture.mem_map,
		..Default::default()
	};

	match cli.command {
		Commands::List => {
			let entries = list_tmpfs_superblocks(&capture, &config)?;
			if entries.is_empty() {
				eprintln!("No tmpfs superblocks found");
			}
			for entry in entries {
				println!("{}", entry);
			}
		}
		Commands::Recover {
			superblock,
			out,
			report,
			skew_secs,
			missing_pages,
			max_file_size,
			max_depth,
			all_hashes,
			verify,
		} => {
			config.timestamp_skew_secs = skew_secs;
			config.missing_pages = match missing_pages.as_str() {
				"abort" => MissingPagePolicy::Abort,
				_ => MissingPagePolicy::ZeroFill,
			};
			if let Some(size) = max_file_size {
				config.max_file_size = size;
			}
			if let Some(depth) = max_depth {
				config.max_depth = depth;
			}
			if all_hashes {
				config.hash_algorithms = HashAlgorithm::all();
			}

			let kernel = capture.kernel();
			let mut engine = RecoveryEngine::new(&kernel, capture.physical(), config);

			let spinner = ProgressBar::new_spinner();
			spinner.set_style(
				ProgressStyle::default_spinner().template("{spinner} {pos} entries {msg}")?,
			);
			spinner.enable_steady_tick(Duration::from_millis(100));
			let bar = spinner.clone();
			engine.set_progress_callback(move |progress| {
				bar.set_position(progress.entries_visited as u64);
				bar.set_message(progress.current_path.display().to_string());
			});

			let result = engine.recover_by_index(&KernelMountTable::new(&kernel), superblock, &out);
			spinner.finish_and_clear();
			let recovery = result?;

			println!(
				"Recovered {} ({:#x}) into {}",
				recovery.superblock.mount_path,
				recovery.superblock.superblock,
				out.display()
			);
			println!("Files: {} ({} bytes)", recovery.files_recovered, recovery.bytes_recovered);
			println!("Directories: {}", recovery.directories_recovered);
			println!("Skipped: {}", recovery.entries_skipped);
			for entry in recovery.skipped() {
				if let Some(reason) = entry.skip_reason() {
					println!("  {} ({:?})", entry.path.display(), reason);
				}
			}

			if verify {
				let checks = recovery.verify();
				let failed: Vec<_> = checks
					.iter()
					.filter(|c| c.status != VerificationStatus::Verified)
					.collect();
				println!("Verified {} of {} digests", checks.len() - failed.len(), checks.len());
				for check in &failed {
					println!(
						"  {} {:?} ({})",
						check.file_path,
						check.status,
						check.algorithm.name()
					);
				}
			}

			if let Some(path) = report {
				recovery
					.save_json(&path)
					.with_context(|| format!("Failed to write report {}", path.display()))?;
				println!("Report: {}", path.display());
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_address() {
		assert_eq!(parse_address("0xffff880000000000").unwrap(), 0xffff_8800_0000_0000);
		assert_eq!(parse_address("4096").unwrap(), 4096);
		assert!(parse_address("0xzz").is_err());
	}

	#[test]
	fn test_recover_arguments() {
		let cli = Cli::try_parse_from([
			"tmpfs-recover", "--image", "mem.raw", "--profile", "linux.json",
			"recover", "--superblock", "2", "--out", "/tmp/out", "--missing-pages", "abort",
		])
		.unwrap();
		assert_eq!(cli.capture.page_offset, 0xffff_8800_0000_0000);
		match cli.command {
			Commands::Recover { superblock, missing_pages, skew_secs, .. } => {
				assert_eq!(superblock, 2);
				assert_eq!(missing_pages, "abort");
				assert_eq!(skew_secs, 18000);
			}
			other => panic!("unexpected command {:?}", other),
		}
	}
}
