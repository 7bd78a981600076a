//! Command-line interface
//!
//! Three commands, each against one venue:
//! - `buy`: ladder of buy orders, sized in the quote asset
//! - `sell`: ladder of sell orders, sized in the base asset
//! - `cancel`: list or cancel open orders on one side
//!
//! Everything runs dry by default; pass `--dry-run=false` to touch orders.

pub mod table;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use crate::adapters::console::ConsolePrompt;
use crate::adapters::registry::{self, VenueContext};
use crate::config::loader::DEFAULT_CONFIG_PATH;
use crate::config::{AppConfig, Credentials};
use crate::domain::OrderSide;
use crate::error::ExchangeError;
use crate::ports::Exchange;
use crate::usecases::{CancelService, LadderInput, LadderService};

/// Ladder CLI
#[derive(Parser, Debug)]
#[command(name = "ladder")]
#[command(about = "Place a ladder of limit orders on a centralized or decentralized exchange")]
#[command(version)]
pub struct Cli {
  /// Path of the optional TOML config file
  #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
  pub config: String,

  #[command(flatten)]
  pub credentials: CredentialArgs,

  #[command(subcommand)]
  pub command: Commands,
}

/// Venue credentials, passed through to the venue as-is.
#[derive(Args, Debug, Default)]
pub struct CredentialArgs {
  /// Exchange API key (1inch: developer portal key)
  #[arg(long, global = true, env = "LADDER_API_KEY", hide_env_values = true)]
  pub api_key: Option<String>,

  /// Exchange API secret
  #[arg(long, global = true, env = "LADDER_API_SECRET", hide_env_values = true)]
  pub api_secret: Option<String>,

  /// Hex private key of your wallet, with or without 0x (DEX only)
  #[arg(long, global = true, env = "LADDER_PRIVATE_KEY", hide_env_values = true)]
  pub private_key: Option<String>,

  /// EVM chain id (DEX only)
  #[arg(
    long,
    global = true,
    env = "LADDER_CHAIN_ID",
    value_parser = clap::value_parser!(u64).range(1..=2_147_483_647)
  )]
  pub chain_id: Option<u64>,
}

impl From<CredentialArgs> for Credentials {
  fn from(args: CredentialArgs) -> Self {
    Self {
      api_key: args.api_key,
      api_secret: args.api_secret,
      private_key: args.private_key,
      chain_id: args.chain_id.unwrap_or_default(),
    }
  }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
  /// Buy your crypto asset
  Buy(LadderArgs),
  /// Sell your crypto asset
  Sell(LadderArgs),
  /// Cancel your open orders
  Cancel(CancelArgs),
}

/// Arguments shared by `buy` and `sell`
#[derive(Args, Debug)]
pub struct LadderArgs {
  /// Name or code of the exchange
  #[arg(long, default_value = "")]
  pub exchange: String,

  /// Asset to buy or sell (symbol, or token address on DEX venues)
  #[arg(long, default_value = "")]
  pub asset: String,

  /// Asset to spend or receive
  #[arg(long, default_value = "")]
  pub quote: String,

  /// Price of the first order
  #[arg(long, default_value = "0")]
  pub start_at_price: Decimal,

  /// Price of the last order
  #[arg(long, default_value = "0")]
  pub stop_at_price: Decimal,

  /// Size of the first order (buy: quote asset, sell: base asset)
  #[arg(long, default_value = "0")]
  pub start_with_size: Decimal,

  /// Growth of every next order, between 1 and 2
  #[arg(long, default_value = "1.05")]
  pub mult: Decimal,

  /// Total quantity (buy: quote asset, sell: base asset)
  #[arg(long, default_value = "0")]
  pub size: Decimal,

  /// Display the output without placing orders
  #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
  pub dry_run: bool,

  /// Days until the orders expire on venues that support it (0 = never)
  #[arg(long, default_value_t = 0)]
  pub days: u32,
}

/// Arguments of `cancel`
#[derive(Args, Debug)]
pub struct CancelArgs {
  /// Name or code of the exchange
  #[arg(long, default_value = "")]
  pub exchange: String,

  /// Base asset
  #[arg(long, default_value = "")]
  pub asset: String,

  /// Quote asset
  #[arg(long, default_value = "")]
  pub quote: String,

  /// "buy" or "sell"
  #[arg(long, default_value = "")]
  pub side: String,

  /// List the open orders without cancelling them
  #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
  pub dry_run: bool,
}

fn non_empty<'a>(flag: &str, value: &'a str) -> Result<&'a str> {
  if value.is_empty() {
    return Err(ExchangeError::missing_flag(flag).into());
  }
  Ok(value)
}

fn non_zero(flag: &str, value: Decimal) -> Result<Decimal> {
  anyhow::ensure!(!value.is_zero(), "--{flag} cannot be zero");
  Ok(value)
}

impl LadderArgs {
  /// Validate the flags into ladder input.
  pub fn input(&self) -> Result<LadderInput> {
    let expiry = (self.days > 0).then(|| Utc::now() + TimeDelta::days(i64::from(self.days)));
    Ok(LadderInput {
      asset: non_empty("asset", &self.asset)?.to_string(),
      quote: non_empty("quote", &self.quote)?.to_string(),
      start_at_price: non_zero("start-at-price", self.start_at_price)?,
      stop_at_price: non_zero("stop-at-price", self.stop_at_price)?,
      start_with_size: non_zero("start-with-size", self.start_with_size)?,
      mult: non_zero("mult", self.mult)?,
      size: non_zero("size", self.size)?,
      expiry,
    })
  }
}

impl CancelArgs {
  pub fn side(&self) -> Result<OrderSide> {
    non_empty("side", &self.side)?
      .parse()
      .map_err(anyhow::Error::msg)
  }
}

fn venue(name: &str, ctx: &VenueContext) -> Result<Box<dyn Exchange>> {
  let venue = registry::build(non_empty("exchange", name)?, ctx)?;
  info!(venue = %venue.info(), "Venue selected");
  Ok(venue)
}

/// Run one parsed command.
pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
  let ctx = VenueContext::new(Arc::new(config), cli.credentials.into());
  match cli.command {
    Commands::Buy(args) => ladder(OrderSide::Buy, &args, &ctx).await,
    Commands::Sell(args) => ladder(OrderSide::Sell, &args, &ctx).await,
    Commands::Cancel(args) => cancel(&args, &ctx).await,
  }
}

async fn ladder(side: OrderSide, args: &LadderArgs, ctx: &VenueContext) -> Result<()> {
  let input = args.input()?;
  let exchange = venue(&args.exchange, ctx)?;
  let service = LadderService::new(exchange.as_ref());

  let plan = service.plan(side, &input).await?;
  println!("{}", table::ladder(&plan));
  if args.dry_run {
    return Ok(());
  }

  let mut prompt = ConsolePrompt::stdio();
  let placement = service
    .place(&plan, &mut prompt, input.expiry)
    .await
    .context("Ladder aborted")?;
  println!(
    "{} of {} orders placed ({} crossing the ticker, {} declined)",
    placement.placed.len(),
    plan.ladder.len(),
    placement.skipped,
    placement.declined
  );
  Ok(())
}

async fn cancel(args: &CancelArgs, ctx: &VenueContext) -> Result<()> {
  let side = args.side()?;
  let exchange = venue(&args.exchange, ctx)?;
  let service = CancelService::new(exchange.as_ref());

  if args.dry_run {
    let open = service.list(&args.asset, &args.quote, side).await?;
    println!("{}", table::open_orders(&open));
  } else {
    service.cancel(&args.asset, &args.quote, side).await?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("ladder").chain(args.iter().copied()))
  }

  #[test]
  fn ladder_defaults() {
    let cli = parse(&["buy", "--exchange", "BINA", "--asset", "eth", "--quote", "usdt"]).unwrap();
    let Commands::Buy(args) = cli.command else {
      panic!("expected buy");
    };
    assert!(args.dry_run);
    assert_eq!(args.mult, dec!(1.05));
    assert_eq!(args.days, 0);
    assert_eq!(cli.config, "ladder.toml");
  }

  #[test]
  fn dry_run_can_be_switched_off() {
    let cli = parse(&["sell", "--dry-run=false"]).unwrap();
    let Commands::Sell(args) = cli.command else {
      panic!("expected sell");
    };
    assert!(!args.dry_run);
    let cli = parse(&["sell", "--dry-run"]).unwrap();
    let Commands::Sell(args) = cli.command else {
      panic!("expected sell");
    };
    assert!(args.dry_run);
  }

  #[test]
  fn zero_flags_are_rejected() {
    let cli = parse(&[
      "sell", "--asset", "BTC", "--quote", "EUR", "--start-at-price", "30000", "--stop-at-price", "40000",
      "--size", "1",
    ])
    .unwrap();
    let Commands::Sell(args) = cli.command else {
      panic!("expected sell");
    };
    let err = args.input().unwrap_err();
    assert_eq!(err.to_string(), "--start-with-size cannot be zero");
  }

  #[test]
  fn empty_asset() {
    let cli = parse(&["buy", "--quote", "EUR"]).unwrap();
    let Commands::Buy(args) = cli.command else {
      panic!("expected buy");
    };
    assert_eq!(args.input().unwrap_err().to_string(), "--asset cannot be empty");
  }

  #[test]
  fn expiry_from_days() {
    let cli = parse(&[
      "buy", "--asset", "WETH", "--quote", "USDC", "--start-at-price", "2000", "--stop-at-price", "1500",
      "--start-with-size", "100", "--size", "1000", "--days", "7",
    ])
    .unwrap();
    let Commands::Buy(args) = cli.command else {
      panic!("expected buy");
    };
    let expiry = args.input().unwrap().expiry.unwrap();
    let days = (expiry - Utc::now()).num_hours();
    assert!((167..=168).contains(&days));
  }

  #[test]
  fn cancel_side() {
    let cli = parse(&["cancel", "--side", "sell"]).unwrap();
    let Commands::Cancel(args) = cli.command else {
      panic!("expected cancel");
    };
    assert_eq!(args.side().unwrap(), OrderSide::Sell);

    let cli = parse(&["cancel", "--side", "both"]).unwrap();
    let Commands::Cancel(args) = cli.command else {
      panic!("expected cancel");
    };
    assert_eq!(
      args.side().unwrap_err().to_string(),
      r#"--side is invalid. valid values are "buy" or "sell""#
    );
  }

  #[test]
  fn chain_id_range() {
    assert!(parse(&["cancel", "--chain-id", "0"]).is_err());
    assert!(parse(&["cancel", "--chain-id", "2147483648"]).is_err());
    let cli = parse(&["cancel", "--chain-id", "137", "--private-key", "0xabc"]).unwrap();
    let credentials = Credentials::from(cli.credentials);
    assert_eq!(credentials.chain_id, 137);
    assert_eq!(credentials.private_key.as_deref(), Some("0xabc"));
  }
}
