use crate::models::{BracketOrder, Side, SymbolFilters};
use crate::strategy::ExitThresholds;
use crate::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// The stop trigger sits slightly inside the stop-loss level so the limit leg
/// still has room to fill.
pub const STOP_SLACK: Decimal = dec!(0.984);

/// Exit prices of a long position, already rounded to the tick size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketPrices {
    pub stop: Decimal,
    pub stop_limit: Decimal,
    pub take_profit: Decimal,
}

/// Round to the nearest multiple of `tick`
pub fn round_to_tick(value: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return value;
    }
    ((value / tick).round() * tick).normalize()
}

/// Round down to a multiple of `step`
pub fn floor_to_step(quantity: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return quantity;
    }
    ((quantity / step).floor() * step).normalize()
}

/// Stop, stop-limit and take-profit prices around an entry
///
/// `stop = price * (1 - stop_loss * 0.984)`, `stop_limit = stop * (1 - stop_loss)`,
/// `take_profit = price * (1 + take_profit)`.
pub fn compute_bracket_prices(
    price: Decimal,
    exits: &ExitThresholds,
    filters: &SymbolFilters,
) -> BracketPrices {
    let stop = price * (Decimal::ONE - exits.stop_loss * STOP_SLACK);
    let stop_limit = stop * (Decimal::ONE - exits.stop_loss);
    let take_profit = price * (Decimal::ONE + exits.take_profit);

    BracketPrices {
        stop: round_to_tick(stop, filters.tick_size),
        stop_limit: round_to_tick(stop_limit, filters.tick_size),
        take_profit: round_to_tick(take_profit, filters.tick_size),
    }
}

/// Token quantity bought with `investment` at `price`, floored to the step size
pub fn quantity_for(investment: Decimal, price: Decimal, filters: &SymbolFilters) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        return Err(Error::Invariant(format!("non-positive price {}", price)));
    }
    let quantity = floor_to_step(investment / price, filters.step_size);
    check_quantity(quantity, filters)?;
    Ok(quantity)
}

fn check_quantity(quantity: Decimal, filters: &SymbolFilters) -> Result<()> {
    let above_max = filters.max_quantity > Decimal::ZERO && quantity > filters.max_quantity;
    if quantity <= Decimal::ZERO || quantity < filters.min_quantity || above_max {
        return Err(Error::Invariant(format!(
            "quantity {} outside lot size [{}, {}]",
            quantity, filters.min_quantity, filters.max_quantity
        )));
    }
    Ok(())
}

/// Check leg ordering for the exit side and the symbol's price bounds
///
/// A SELL bracket protects a long: `stop_limit < stop < take_profit`.
/// A BUY bracket protects a short: `take_profit < stop < stop_limit`.
pub fn validate_bracket(side: Side, prices: &BracketPrices, filters: &SymbolFilters) -> Result<()> {
    let ordered = match side {
        Side::Sell => prices.stop_limit < prices.stop && prices.stop < prices.take_profit,
        Side::Buy => prices.take_profit < prices.stop && prices.stop < prices.stop_limit,
    };
    if !ordered {
        return Err(Error::Invariant(format!(
            "{} bracket prices out of order: stop_limit={} stop={} take_profit={}",
            side, prices.stop_limit, prices.stop, prices.take_profit
        )));
    }

    for (label, price) in [
        ("stop", prices.stop),
        ("stop_limit", prices.stop_limit),
        ("take_profit", prices.take_profit),
    ] {
        let above_max = filters.max_price > Decimal::ZERO && price > filters.max_price;
        if price <= Decimal::ZERO || price < filters.min_price || above_max {
            return Err(Error::Invariant(format!(
                "{} price {} outside [{}, {}]",
                label, price, filters.min_price, filters.max_price
            )));
        }
    }

    Ok(())
}

/// Assemble a validated SELL bracket protecting `quantity` tokens
pub fn sell_bracket(
    symbol: &str,
    quantity: Decimal,
    prices: &BracketPrices,
    filters: &SymbolFilters,
    client_order_id: String,
) -> Result<BracketOrder> {
    validate_bracket(Side::Sell, prices, filters)?;
    let quantity = floor_to_step(quantity, filters.step_size);
    check_quantity(quantity, filters)?;

    let order = BracketOrder {
        side: Side::Sell,
        symbol: symbol.to_string(),
        quantity,
        stop_price: prices.stop,
        stop_limit_price: prices.stop_limit,
        take_profit_price: prices.take_profit,
        client_order_id,
    };
    order.legs()?;
    Ok(order)
}
