#![forbid(unsafe_code)]
//! Command-line companion for the star registry: keys, signatures and chain inspection.

use clap::{Parser, Subcommand};
use colored::*;
use starchain::blockchain::{Block, BlockBody};
use starchain::config::load_config_from;
use starchain::crypto::KeyPair;
use starchain::node::open_registry;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generates a new key pair and prints its address
    Keygen,
    /// Signs an identity challenge message
    Sign {
        /// Hex-encoded secret key
        #[arg(long)]
        secret: String,
        /// The challenge message returned by /requestValidation
        message: String,
    },
    /// Shows the block at a height
    Block {
        height: String,
    },
    /// Lists the stars registered by an address
    Stars {
        address: String,
    },
    /// Validates every block and link in the chain
    Validate,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Keygen => keygen()?,
        Commands::Sign { secret, message } => sign(secret, message)?,
        Commands::Block { height } => {
            let registry = open_registry(&load_config_from(&cli.config)?)?;
            let height = starchain::blockchain::parse_height(height)?;
            print_block(&registry.ledger().get_by_height(height)?);
        }
        Commands::Stars { address } => {
            let registry = open_registry(&load_config_from(&cli.config)?)?;
            for block in registry.ledger().get_by_address(address)? {
                print_block(&block);
            }
        }
        Commands::Validate => validate(&cli.config)?,
    }

    Ok(())
}

fn keygen() -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::generate()?;
    println!("{}", "🔑 New key pair".bright_cyan().bold());
    println!("  {} {}", "Address:".bright_white(), keypair.address().green());
    println!("  {} {}", "Secret: ".bright_white(), keypair.secret_key_hex().yellow());
    println!();
    println!("{}", "⚠️  Keep the secret key private.".red());
    Ok(())
}

fn sign(secret: &str, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::from_secret_hex(secret)?;
    let signature = keypair.sign_message(message)?;
    println!("{}", signature);
    Ok(())
}

fn validate(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(&load_config_from(config_path)?)?;
    let ledger = registry.ledger();
    let invalid = ledger.validate_chain()?;

    println!(
        "{}",
        format!("Validated {} block(s)", ledger.height() + 1).bright_cyan()
    );
    if invalid.is_empty() {
        println!("{}", "✅ No errors detected".green().bold());
    } else {
        println!(
            "{}",
            format!("❌ Block errors = {}", invalid.len()).red().bold()
        );
        let heights: Vec<String> = invalid.iter().map(|h| h.to_string()).collect();
        println!("{} {}", "Blocks:".red(), heights.join(", "));
    }
    Ok(())
}

fn print_block(block: &Block) {
    println!(
        "{} {}",
        format!("Block #{}", block.height).bright_magenta().bold(),
        block.hash.dimmed()
    );
    println!("  previous: {}", block.previous_block_hash);
    println!("  time:     {}", block.time);
    match &block.body {
        BlockBody::Text(text) => println!("  body:     {}", text),
        BlockBody::Star(record) => {
            println!("  owner:    {}", record.address.green());
            println!("  ra/dec:   {} / {}", record.star.ra, record.star.dec);
            if let Some(story) = &record.star.story_decoded {
                println!("  story:    {}", story.italic());
            }
        }
    }
}
