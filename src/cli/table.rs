//! Plain-text tables for ladders and open orders.

use rust_decimal::Decimal;

use crate::domain::{Order, Precision, precision};
use crate::usecases::{LadderPlan, OpenOrders};

/// Render rows under an upper-cased header, boxed with `+-|`.
pub fn render(header: &[&str], rows: &[Vec<String>]) -> String {
  let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
  for row in rows {
    for (i, cell) in row.iter().enumerate() {
      if let Some(width) = widths.get_mut(i) {
        *width = (*width).max(cell.chars().count());
      }
    }
  }

  let rule: String = widths
    .iter()
    .map(|w| format!("+{}", "-".repeat(w + 2)))
    .chain(std::iter::once("+".to_string()))
    .collect();
  let line = |cells: &[String]| -> String {
    let mut out = String::new();
    for (i, width) in widths.iter().enumerate() {
      let cell = cells.get(i).map_or("", String::as_str);
      out.push_str(&format!("| {cell:<width$} "));
    }
    out.push('|');
    out
  };

  let header: Vec<String> = header.iter().map(|h| h.to_uppercase()).collect();
  let mut out = vec![rule.clone(), line(&header), rule.clone()];
  out.extend(rows.iter().map(|row| line(row)));
  out.push(rule);
  out.join("\n")
}

fn fixed(value: Decimal, places: u32) -> String {
  format!("{:.*}", places as usize, precision::round(value, places))
}

fn price(value: Decimal, quote: &str, prec: Precision) -> String {
  format!("{quote} {}", fixed(value, prec.price))
}

fn value(order: &Order, quote: &str, prec: Precision) -> String {
  order
    .value()
    .map_or_else(|| "-".to_string(), |value| price(value, quote, prec))
}

fn size(value: Decimal, asset: &str, prec: Precision) -> String {
  format!("{} {asset}", fixed(value, prec.size))
}

/// The ladder with a TOTAL row.
pub fn ladder(plan: &LadderPlan) -> String {
  let market = &plan.market;
  let prec = market.precision;
  let mut rows: Vec<Vec<String>> = plan
    .ladder
    .steps()
    .iter()
    .map(|step| {
      vec![
        (step.index + 1).to_string(),
        price(step.order.price, &market.quote, prec),
        size(step.order.size, &market.asset, prec),
        value(&step.order, &market.quote, prec),
      ]
    })
    .collect();

  let total = plan.ladder.rounded_totals();
  rows.push(vec![
    "TOTAL".to_string(),
    String::new(),
    size(total.size, &market.asset, prec),
    price(total.value, &market.quote, prec),
  ]);
  render(&["", "Price", "Size", "Value"], &rows)
}

/// Open orders with their side.
pub fn open_orders(open: &OpenOrders) -> String {
  let market = &open.market;
  let prec = market.precision;
  let rows: Vec<Vec<String>> = open
    .orders
    .iter()
    .enumerate()
    .map(|(index, order)| {
      vec![
        (index + 1).to_string(),
        open.side.to_string(),
        price(order.price, &market.quote, prec),
        size(order.size, &market.asset, prec),
        value(order, &market.quote, prec),
      ]
    })
    .collect();
  render(&["", "Side", "Price", "Size", "Value"], &rows)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Denomination, LadderParams, OrderSide};
  use crate::usecases::MarketRef;
  use rust_decimal_macros::dec;

  fn market() -> MarketRef {
    MarketRef {
      asset: "BTC".into(),
      quote: "USDT".into(),
      market: "BTCUSDT".into(),
      precision: Precision { price: 2, size: 4 },
    }
  }

  #[test]
  fn boxed_layout() {
    let text = render(&["", "Price"], &[vec!["1".into(), "USDT 10.00".into()]]);
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "+---+------------+");
    assert_eq!(lines[1], "|   | PRICE      |");
    assert_eq!(lines[3], "| 1 | USDT 10.00 |");
    assert_eq!(lines.len(), 5);
  }

  #[test]
  fn ladder_ends_with_total() {
    let params = LadderParams {
      start_at_price: dec!(100),
      stop_at_price: dec!(200),
      start_with_size: dec!(1),
      mult: dec!(1.5),
      size: dec!(5),
      denomination: Denomination::Base,
    };
    let plan = LadderPlan {
      side: OrderSide::Sell,
      market: market(),
      ladder: params.generate(market().precision).unwrap(),
    };
    let text = ladder(&plan);
    let total = text.lines().rev().nth(1).unwrap();
    assert!(total.starts_with("| TOTAL |"), "{total}");
    assert!(total.contains("5.0000 BTC"), "{total}");
    assert!(text.contains("USDT 100.00"));
  }

  #[test]
  fn open_orders_show_side() {
    let open = OpenOrders {
      side: OrderSide::Buy,
      market: market(),
      orders: vec![Order { price: dec!(25000), size: dec!(0.01) }],
    };
    let text = open_orders(&open);
    assert!(text.contains("| 1 | BUY  | USDT 25000.00 | 0.0100 BTC | USDT 250.00 |"), "{text}");
  }

  #[test]
  fn out_of_range_value_shows_a_dash() {
    let open = OpenOrders {
      side: OrderSide::Sell,
      market: market(),
      orders: vec![Order { price: Decimal::MAX, size: dec!(3) }],
    };
    let text = open_orders(&open);
    let row = text.lines().nth(3).unwrap();
    assert!(row.ends_with("| -     |"), "{row}");
  }
}
