//! Integration Tests - Ladder Orchestration Against Mock Venues
//!
//! Drives the buy/sell/cancel use cases through mocked `Exchange` and
//! `Prompt` ports. Uses mockall for trait mocking and tokio::test for
//! async tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::U256;
use mockall::mock;
use mockall::predicate::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ladder::adapters::registry::{self, VenueContext};
use ladder::domain::{Order, OrderSide, Precision};
use ladder::error::{ExchangeError, Result};
use ladder::ports::{Answer, Exchange, OrderRequest, Prompt, VenueInfo};
use ladder::usecases::{CancelService, LadderInput, LadderService};

// ---- Mock Definitions ----

mock! {
    pub Venue {}

    #[async_trait::async_trait]
    impl Exchange for Venue {
        fn info(&self) -> VenueInfo;
        async fn format_symbol(&self, asset: &str) -> Result<String>;
        fn format_market(&self, asset: &str, quote: &str) -> Result<String>;
        async fn precision(&self, market: &str) -> Result<Precision>;
        async fn ticker(&self, market: &str) -> Result<Option<Decimal>>;
        async fn orders(&self, market: &str, side: OrderSide) -> Result<Vec<Order>>;
        async fn cancel(&self, market: &str, side: OrderSide) -> Result<()>;
        async fn order(&self, market: &str, request: &OrderRequest) -> Result<Option<String>>;
        async fn nonce(&self) -> Result<Option<U256>>;
    }
}

mock! {
    pub Asker {}

    impl Prompt for Asker {
        fn confirm(&mut self, description: &str) -> anyhow::Result<ladder::ports::Answer>;
    }
}

// ---- Helpers ----

const PREC: Precision = Precision { price: 2, size: 6 };

/// A venue that only knows its name.
fn bare() -> MockVenue {
    let mut venue = MockVenue::new();
    venue.expect_info().return_const(VenueInfo {
        code: "MOCK",
        name: "Mock",
    });
    venue
}

/// A venue that resolves BTC/USDT and expects nothing else by default.
fn venue() -> MockVenue {
    let mut venue = bare();
    venue
        .expect_format_symbol()
        .returning(|asset| Ok(asset.to_uppercase()));
    venue
        .expect_format_market()
        .returning(|asset, quote| Ok(format!("{asset}{quote}").to_uppercase()));
    venue
        .expect_precision()
        .with(eq("BTCUSDT"))
        .returning(|_| Ok(PREC));
    venue
}

fn buy_input() -> LadderInput {
    LadderInput {
        asset: "btc".into(),
        quote: "usdt".into(),
        start_at_price: dec!(25000),
        stop_at_price: dec!(30000),
        start_with_size: dec!(1000),
        mult: dec!(1.05),
        size: dec!(10000),
        expiry: None,
    }
}

fn sell_input() -> LadderInput {
    LadderInput {
        asset: "btc".into(),
        quote: "usdt".into(),
        start_at_price: dec!(30000),
        stop_at_price: dec!(40000),
        start_with_size: dec!(0.1),
        mult: dec!(1.1),
        size: dec!(1),
        expiry: None,
    }
}

/// Live-path expectations: cancel, ticker and nonce once each.
fn live(venue: &mut MockVenue, side: OrderSide, ticker: Option<Decimal>) {
    venue
        .expect_cancel()
        .with(eq("BTCUSDT"), eq(side))
        .times(1)
        .returning(|_, _| Ok(()));
    venue
        .expect_ticker()
        .times(1)
        .returning(move |_| Ok(ticker));
    venue.expect_nonce().times(1).returning(|| Ok(None));
}

// ---- Planning ----

#[tokio::test]
async fn test_dry_run_touches_no_orders() {
    let venue = venue();
    let service = LadderService::new(&venue);

    let plan = service.plan(OrderSide::Buy, &buy_input()).await.unwrap();

    assert_eq!(plan.market.market, "BTCUSDT");
    assert_eq!(plan.market.asset, "BTC");
    assert_eq!(plan.market.precision, PREC);
    let prices: Vec<_> = plan.ladder.steps().iter().map(|s| s.order.price).collect();
    assert_eq!(prices.first(), Some(&dec!(30000)));
    assert_eq!(prices.last(), Some(&dec!(25000)));
    assert!(prices.windows(2).all(|w| w[1] < w[0]));
}

#[tokio::test]
async fn test_invalid_mult_fails_before_any_request() {
    let venue = bare();
    let service = LadderService::new(&venue);
    let mut input = sell_input();
    input.mult = dec!(2);

    let err = service.plan(OrderSide::Sell, &input).await.unwrap_err();
    assert_eq!(err.to_string(), "--mult is invalid. valid values are between 1 and 2");
}

#[tokio::test]
async fn test_unknown_market_surfaces() {
    let mut venue = bare();
    venue
        .expect_format_market()
        .returning(|asset, quote| Ok(format!("{asset}{quote}")));
    venue
        .expect_precision()
        .times(1)
        .returning(|market| Err(ExchangeError::MarketNotFound(market.to_string())));
    let service = LadderService::new(&venue);

    let err = service.plan(OrderSide::Sell, &sell_input()).await.unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("market btcusdt does not exist"), "{chain}");
}

// ---- Placement ----

#[tokio::test]
async fn test_buy_skips_orders_above_ticker() {
    let ticker = dec!(28000);
    let mut venue = venue();
    live(&mut venue, OrderSide::Buy, Some(ticker));

    let submitted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&submitted);
    venue
        .expect_order()
        .withf(move |market, request| {
            market == "BTCUSDT" && request.side == OrderSide::Buy && request.price < ticker
        })
        .returning(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("order-{n}")))
        });

    let mut prompt = MockAsker::new();
    prompt
        .expect_confirm()
        .times(1)
        .returning(|_| Ok(Answer::YesToAll));

    let service = LadderService::new(&venue);
    let plan = service.plan(OrderSide::Buy, &buy_input()).await.unwrap();
    let placement = service.place(&plan, &mut prompt, None).await.unwrap();

    let passive = plan
        .ladder
        .steps()
        .iter()
        .filter(|s| s.order.price < ticker)
        .count();
    assert!(passive > 0 && passive < plan.ladder.len());
    assert_eq!(placement.placed.len(), passive);
    assert_eq!(placement.skipped, plan.ladder.len() - passive);
    assert_eq!(submitted.load(Ordering::SeqCst), passive);
    assert_eq!(placement.placed[0].as_deref(), Some("order-0"));
}

#[tokio::test]
async fn test_sell_without_ticker_submits_everything() {
    let mut venue = venue();
    live(&mut venue, OrderSide::Sell, None);
    venue.expect_order().returning(|_, _| Ok(None));

    let mut prompt = MockAsker::new();
    prompt.expect_confirm().returning(|_| Ok(Answer::Yes));

    let service = LadderService::new(&venue);
    let plan = service.plan(OrderSide::Sell, &sell_input()).await.unwrap();
    let placement = service.place(&plan, &mut prompt, None).await.unwrap();

    assert_eq!(placement.placed.len(), plan.ladder.len());
    assert_eq!(placement.skipped, 0);
    let total: Decimal = plan.ladder.steps().iter().map(|s| s.order.size).sum();
    assert_eq!(total, dec!(1));
}

#[tokio::test]
async fn test_declined_orders_are_not_sent() {
    let mut venue = venue();
    live(&mut venue, OrderSide::Sell, Some(dec!(1)));
    venue.expect_order().never();

    let mut prompt = MockAsker::new();
    prompt
        .expect_confirm()
        .withf(|description| description.starts_with("SELL ") && description.contains("BTCUSDT @ "))
        .returning(|_| Ok(Answer::No));

    let service = LadderService::new(&venue);
    let plan = service.plan(OrderSide::Sell, &sell_input()).await.unwrap();
    let placement = service.place(&plan, &mut prompt, None).await.unwrap();

    assert!(placement.placed.is_empty());
    assert_eq!(placement.declined, plan.ladder.len());
}

#[tokio::test]
async fn test_failed_order_abandons_the_rest() {
    let mut venue = venue();
    live(&mut venue, OrderSide::Sell, None);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    venue.expect_order().returning(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Some("first".into()))
        } else {
            Err(ExchangeError::Rejected {
                venue: "Mock",
                message: "insufficient balance".into(),
            })
        }
    });

    let mut prompt = MockAsker::new();
    prompt.expect_confirm().returning(|_| Ok(Answer::YesToAll));

    let service = LadderService::new(&venue);
    let plan = service.plan(OrderSide::Sell, &sell_input()).await.unwrap();
    assert!(plan.ladder.len() > 2);
    let err = service.place(&plan, &mut prompt, None).await.unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let chain = format!("{err:#}");
    assert!(chain.contains("after 1 orders were placed"), "{chain}");
    assert!(chain.contains("insufficient balance"), "{chain}");
}

#[tokio::test]
async fn test_cancel_unsupported_stops_placement() {
    let mut venue = venue();
    venue.expect_cancel().times(1).returning(|_, _| {
        Err(ExchangeError::CancelUnsupported(
            "https://app.paraswap.io/#/limit".into(),
        ))
    });
    venue.expect_ticker().never();
    venue.expect_order().never();

    let mut prompt = MockAsker::new();
    prompt.expect_confirm().never();

    let service = LadderService::new(&venue);
    let plan = service.plan(OrderSide::Sell, &sell_input()).await.unwrap();
    let err = service.place(&plan, &mut prompt, None).await.unwrap_err();
    assert!(format!("{err:#}").contains("please cancel your orders on https://app.paraswap.io/#/limit"));
}

#[tokio::test]
async fn test_nonce_and_expiry_reach_every_order() {
    let mut venue = venue();
    venue.expect_cancel().returning(|_, _| Ok(()));
    venue.expect_ticker().returning(|_| Ok(None));
    venue
        .expect_nonce()
        .times(1)
        .returning(|| Ok(Some(U256::from(7))));
    let expiry = chrono::Utc::now() + chrono::TimeDelta::days(3);
    venue
        .expect_order()
        .withf(move |_, request| request.nonce == Some(U256::from(7)) && request.expiry == Some(expiry))
        .returning(|_, _| Ok(Some("0xhash".into())));

    let mut prompt = MockAsker::new();
    prompt.expect_confirm().returning(|_| Ok(Answer::YesToAll));

    let service = LadderService::new(&venue);
    let plan = service.plan(OrderSide::Sell, &sell_input()).await.unwrap();
    let placement = service.place(&plan, &mut prompt, Some(expiry)).await.unwrap();
    assert!(placement.placed.iter().all(|id| id.as_deref() == Some("0xhash")));
}

// ---- Cancel ----

#[tokio::test]
async fn test_cancel_dry_run_lists_orders() {
    let mut venue = venue();
    venue
        .expect_orders()
        .with(eq("BTCUSDT"), eq(OrderSide::Buy))
        .times(1)
        .returning(|_, _| {
            Ok(vec![
                Order { price: dec!(25000), size: dec!(0.01) },
                Order { price: dec!(24000), size: dec!(0.02) },
            ])
        });
    venue.expect_cancel().never();

    let open = CancelService::new(&venue)
        .list("btc", "usdt", OrderSide::Buy)
        .await
        .unwrap();
    assert_eq!(open.orders.len(), 2);
    assert_eq!(open.market.precision, PREC);
}

#[tokio::test]
async fn test_cancel_cancels_one_side() {
    let mut venue = venue();
    venue
        .expect_cancel()
        .with(eq("BTCUSDT"), eq(OrderSide::Sell))
        .times(1)
        .returning(|_, _| Ok(()));

    let market = CancelService::new(&venue)
        .cancel("btc", "usdt", OrderSide::Sell)
        .await
        .unwrap();
    assert_eq!(market.market, "BTCUSDT");
}

#[tokio::test]
async fn test_cancel_needs_asset() {
    let venue = bare();
    let err = CancelService::new(&venue)
        .cancel("", "usdt", OrderSide::Sell)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "--asset cannot be empty");
}

// ---- Registry ----

#[test]
fn test_registry_builds_every_venue_offline() {
    let ctx = VenueContext::default();
    for entry in registry::venues() {
        let venue = entry.build(&ctx).unwrap();
        assert_eq!(venue.info(), entry.info);
    }
    assert!(matches!(
        registry::build("ftx", &ctx).err(),
        Some(ExchangeError::UnsupportedExchange(_))
    ));
}

#[test]
fn test_market_formats_per_venue() {
    let ctx = VenueContext::default();
    let format = |name: &str| {
        registry::build(name, &ctx)
            .unwrap()
            .format_market("btc", "usdt")
            .unwrap()
    };
    assert_eq!(format("BINA"), "BTCUSDT");
    assert_eq!(format("KRKN"), "BTCUSDT");
    assert_eq!(format("BITS"), "btcusdt");
    assert_eq!(format("COIN"), "BTC-USDT");
    assert_eq!(format("BTRX"), "BTC-USDT");
    assert_eq!(format("1inch"), "BTC-USDT");
    assert_eq!(format("PSP"), "BTC-USDT");
}
