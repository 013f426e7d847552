//! # Register Shell
//!
//! A line-per-command front end over [`crate::commands`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stdin line ──► parse() ──► Command ──► Shell::execute ──► Reply        │
//! │                   │                          │                │         │
//! │              ParseError                  ApiError             │         │
//! │                   └──────────────┬───────────┘                │         │
//! │                                  ▼                            ▼         │
//! │                       "Error: ..." / {"code":..}    text / JSON         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Blank lines and lines starting with `#` are skipped, so a file of
//! commands can be piped in.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use till_core::{LoyaltyPoints, Money, PaymentMethod, TaxRate};

use crate::commands::cart::CartResponse;
use crate::commands::{
    self, CompleteSaleResponse, CustomerDto, ProductDto, RefundLogDto, RefundResponse,
    RestockResponse, SaleDto, SaleSummaryDto, UserDto,
};
use crate::error::ApiError;
use crate::state::AppState;

pub const HELP: &str = "\
Session
  login <user> <password>        start a session
  logout                         end it (open cart is released)
  whoami
Cart
  find [text]                    search products by barcode or name
  add <barcode|name> [qty]       add to cart (default qty 1)
  remove <line>                  remove cart line (1-based)
  clear                          empty the cart
  cart                           show the cart
  promo <code|off>               apply or clear a promo code
  customer <phone|off>           attach or detach a customer
Payment
  pay <cash|card|voucher|loyalty> <amount>
  payments [clear]
  complete                       finish the sale
Sales and refunds
  sale <id>                      show a sale
  sales [n]                      recent sales
  refund <id>                    refund a whole sale
  refund-lines <id> <line>...    refund some lines
  refunds [n|sale-id]            refund log
Stock
  lowstock
  restock <barcode> <qty>
  product <barcode> <price> <threshold> <tax> <name>
Customers
  customers [text]               list or search
  customers save <phone> <contact> <name>
Other
  help
  quit";

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Logout,
    Whoami,
    Find(String),
    Add { query: String, qty: i64 },
    Remove(usize),
    Clear,
    Cart,
    Promo(Option<String>),
    Customer(Option<String>),
    Pay { method: PaymentMethod, amount: Money },
    Payments,
    ClearPayments,
    Complete,
    Sale(String),
    Sales(Option<u32>),
    Refund(String),
    RefundLines { sale_id: String, lines: Vec<i64> },
    Refunds { sale_id: Option<String>, limit: Option<u32> },
    LowStock,
    Restock { barcode: String, qty: i64 },
    Product {
        barcode: String,
        price: Money,
        low_stock_threshold: i64,
        tax_rate: TaxRate,
        name: String,
    },
    Customers(Option<String>),
    SaveCustomer { phone: String, contact: String, name: String },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid {field}: '{value}'")]
    Invalid { field: &'static str, value: String },
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        ApiError::validation(err.to_string())
    }
}

fn number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::Invalid {
        field,
        value: value.to_string(),
    })
}

/// Parses one shell line.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = words.split_first() else {
        return Err(ParseError::Usage("help"));
    };
    let rest = args.join(" ");

    let cmd = match (head.to_lowercase().as_str(), args) {
        ("login", [user, password]) => Command::Login {
            username: user.to_string(),
            password: password.to_string(),
        },
        ("login", _) => return Err(ParseError::Usage("login <user> <password>")),
        ("logout", []) => Command::Logout,
        ("whoami", []) => Command::Whoami,

        ("find", _) => Command::Find(rest),
        ("add", []) => return Err(ParseError::Usage("add <barcode|name> [qty]")),
        ("add", [query]) => Command::Add {
            query: query.to_string(),
            qty: 1,
        },
        ("add", [query @ .., last]) => match last.parse::<i64>() {
            Ok(qty) => Command::Add {
                query: query.join(" "),
                qty,
            },
            Err(_) => Command::Add { query: rest, qty: 1 },
        },
        ("remove", [line]) => Command::Remove(number("line number", line)?),
        ("remove", _) => return Err(ParseError::Usage("remove <line>")),
        ("clear", []) => Command::Clear,
        ("cart", []) => Command::Cart,
        ("promo", [code]) if code.eq_ignore_ascii_case("off") => Command::Promo(None),
        ("promo", [code]) => Command::Promo(Some(code.to_string())),
        ("promo", _) => return Err(ParseError::Usage("promo <code|off>")),
        ("customer", [phone]) if phone.eq_ignore_ascii_case("off") => Command::Customer(None),
        ("customer", [phone]) => Command::Customer(Some(phone.to_string())),
        ("customer", _) => return Err(ParseError::Usage("customer <phone|off>")),

        ("pay", [method, amount]) => Command::Pay {
            method: number("payment method", method)?,
            amount: number("amount", amount)?,
        },
        ("pay", _) => return Err(ParseError::Usage("pay <method> <amount>")),
        ("payments", []) => Command::Payments,
        ("payments", [sub]) if sub.eq_ignore_ascii_case("clear") => Command::ClearPayments,
        ("payments", _) => return Err(ParseError::Usage("payments [clear]")),
        ("complete", []) => Command::Complete,

        ("sale", [id]) => Command::Sale(id.to_string()),
        ("sale", _) => return Err(ParseError::Usage("sale <id>")),
        ("sales", []) => Command::Sales(None),
        ("sales", [n]) => Command::Sales(Some(number("count", n)?)),
        ("refund", [id]) => Command::Refund(id.to_string()),
        ("refund", _) => return Err(ParseError::Usage("refund <id>")),
        ("refund-lines", [id, lines @ ..]) if !lines.is_empty() => Command::RefundLines {
            sale_id: id.to_string(),
            lines: lines
                .iter()
                .map(|l| number("line number", l))
                .collect::<Result<_, _>>()?,
        },
        ("refund-lines", _) => return Err(ParseError::Usage("refund-lines <id> <line>...")),
        ("refunds", []) => Command::Refunds {
            sale_id: None,
            limit: None,
        },
        ("refunds", [arg]) => match arg.parse::<u32>() {
            Ok(n) => Command::Refunds {
                sale_id: None,
                limit: Some(n),
            },
            Err(_) => Command::Refunds {
                sale_id: Some(arg.to_string()),
                limit: None,
            },
        },

        ("lowstock", []) => Command::LowStock,
        ("restock", [barcode, qty]) => Command::Restock {
            barcode: barcode.to_string(),
            qty: number("quantity", qty)?,
        },
        ("restock", _) => return Err(ParseError::Usage("restock <barcode> <qty>")),
        ("product", [barcode, price, threshold, tax, name @ ..]) if !name.is_empty() => {
            Command::Product {
                barcode: barcode.to_string(),
                price: number("price", price)?,
                low_stock_threshold: number("threshold", threshold)?,
                tax_rate: number("tax rate", tax)?,
                name: name.join(" "),
            }
        }
        ("product", _) => {
            return Err(ParseError::Usage("product <barcode> <price> <threshold> <tax> <name>"))
        }

        ("customers", [sub, phone, contact, name @ ..])
            if sub.eq_ignore_ascii_case("save") && !name.is_empty() =>
        {
            Command::SaveCustomer {
                phone: phone.to_string(),
                contact: contact.to_string(),
                name: name.join(" "),
            }
        }
        ("customers", [sub, ..]) if sub.eq_ignore_ascii_case("save") => {
            return Err(ParseError::Usage("customers save <phone> <contact> <name>"))
        }
        ("customers", []) => Command::Customers(None),
        ("customers", _) => Command::Customers(Some(rest)),

        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) if is_known(other) => return Err(ParseError::Usage("help")),
        (other, _) => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(cmd)
}

fn is_known(word: &str) -> bool {
    matches!(
        word,
        "logout"
            | "whoami"
            | "clear"
            | "cart"
            | "complete"
            | "sales"
            | "refunds"
            | "lowstock"
    )
}

// =============================================================================
// Replies
// =============================================================================

/// What a command produced. Serialized as-is in JSON mode.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Message { message: String },
    User(UserDto),
    Cart(CartResponse),
    Products(Vec<ProductDto>),
    Product(ProductDto),
    Restocked(RestockResponse),
    Completed(CompleteSaleResponse),
    Sale(SaleDto),
    Sales(Vec<SaleSummaryDto>),
    Refund(RefundResponse),
    Refunds(Vec<RefundLogDto>),
    Customers(Vec<CustomerDto>),
    Customer(CustomerDto),
    Quit { message: String },
}

impl Reply {
    fn message(text: impl Into<String>) -> Self {
        Reply::Message {
            message: text.into(),
        }
    }
}

// =============================================================================
// Shell
// =============================================================================

pub struct Shell {
    state: AppState,
    json: bool,
}

impl Shell {
    pub fn new(state: AppState, json: bool) -> Self {
        Shell { state, json }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Reads commands until `quit` or end of input.
    ///
    /// Whatever session is open at the end is logged out, so reserved stock
    /// goes back to the shelf.
    pub async fn run<R, W>(&self, input: R, output: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        if !self.json {
            let banner = format!(
                "{} register. Type 'help' for commands.\n",
                self.state.config.config.store.name
            );
            output.write_all(banner.as_bytes()).await?;
        }

        loop {
            if !self.json {
                output.write_all(b"till> ").await?;
                output.flush().await?;
            }

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let result = match parse(line) {
                Ok(cmd) => {
                    // Only the verb; login lines carry a password
                    debug!(command = %line.split_whitespace().next().unwrap_or_default(), "Executing shell command");
                    self.execute(cmd).await
                }
                Err(e) => Err(e.into()),
            };
            let quit = matches!(result, Ok(Reply::Quit { .. }));

            let mut text = self.render(&result);
            text.push('\n');
            output.write_all(text.as_bytes()).await?;
            output.flush().await?;

            if quit {
                break;
            }
        }

        if let Err(e) = commands::session::logout(&self.state) {
            warn!(error = %e, "Logout at shell exit failed");
        }
        Ok(())
    }

    /// Runs one command against the register state.
    pub async fn execute(&self, cmd: Command) -> Result<Reply, ApiError> {
        use commands::{cart, customer, inventory, refund, sale, session};
        let state = &self.state;

        let reply = match cmd {
            Command::Login { username, password } => {
                Reply::User(session::login(state, &username, &password)?)
            }
            Command::Logout => match session::logout(state)? {
                Some(user) => Reply::message(format!("Logged out {}", user.username)),
                None => Reply::message("Nobody is logged in"),
            },
            Command::Whoami => match session::whoami(state) {
                Some(user) => Reply::User(user),
                None => Reply::message("Nobody is logged in"),
            },

            Command::Find(query) => Reply::Products(inventory::find_products(state, &query)?),
            Command::Add { query, qty } => Reply::Cart(cart::add_to_cart(state, &query, qty)?),
            Command::Remove(line) => Reply::Cart(cart::remove_line(state, line)?),
            Command::Clear => Reply::Cart(cart::clear_cart(state)?),
            Command::Cart => Reply::Cart(cart::get_cart(state)?),
            Command::Promo(Some(code)) => Reply::Cart(cart::apply_promo(state, &code)?),
            Command::Promo(None) => Reply::Cart(cart::clear_promo(state)?),
            Command::Customer(Some(phone)) => {
                Reply::Cart(cart::attach_customer(state, &phone).await?)
            }
            Command::Customer(None) => Reply::Cart(cart::detach_customer(state)?),

            Command::Pay { method, amount } => {
                Reply::Cart(sale::add_payment(state, method, amount)?)
            }
            Command::Payments => Reply::Cart(cart::get_cart(state)?),
            Command::ClearPayments => Reply::Cart(sale::clear_payments(state)?),
            Command::Complete => Reply::Completed(sale::complete_sale(state).await?),
            Command::Sale(id) => Reply::Sale(sale::get_sale(state, &id).await?),
            Command::Sales(limit) => Reply::Sales(sale::list_sales(state, limit).await?),

            Command::Refund(id) => Reply::Refund(refund::refund_sale(state, &id).await?),
            Command::RefundLines { sale_id, lines } => {
                Reply::Refund(refund::refund_lines(state, &sale_id, &lines).await?)
            }
            Command::Refunds { sale_id, limit } => {
                Reply::Refunds(refund::list_refunds(state, sale_id.as_deref(), limit).await?)
            }

            Command::LowStock => Reply::Products(inventory::low_stock(state)?),
            Command::Restock { barcode, qty } => {
                Reply::Restocked(inventory::restock(state, &barcode, qty).await?)
            }
            Command::Product {
                barcode,
                price,
                low_stock_threshold,
                tax_rate,
                name,
            } => Reply::Product(
                inventory::save_product(state, &barcode, &name, price, low_stock_threshold, tax_rate)
                    .await?,
            ),

            Command::Customers(query) => {
                Reply::Customers(customer::list_customers(state, query.as_deref()).await?)
            }
            Command::SaveCustomer {
                phone,
                contact,
                name,
            } => Reply::Customer(customer::save_customer(state, &phone, &name, &contact).await?),

            Command::Help => Reply::message(HELP),
            Command::Quit => Reply::Quit {
                message: "Bye".to_string(),
            },
        };
        Ok(reply)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    fn render(&self, result: &Result<Reply, ApiError>) -> String {
        if self.json {
            let value = match result {
                Ok(reply) => serde_json::to_string(reply),
                Err(err) => serde_json::to_string(err),
            };
            return value.unwrap_or_else(|e| {
                format!(r#"{{"code":"INTERNAL","message":"{}"}}"#, e)
            });
        }

        match result {
            Ok(reply) => self.render_text(reply),
            Err(err) => format!("Error: {}", err.message),
        }
    }

    fn money(&self, cents: i64) -> String {
        self.state.config.format_currency(Money::from_cents(cents))
    }

    fn render_text(&self, reply: &Reply) -> String {
        match reply {
            Reply::Message { message } | Reply::Quit { message } => message.clone(),
            Reply::User(user) => format!("Logged in as {} ({})", user.username, user.role),
            Reply::Cart(cart) => self.render_cart(cart),
            Reply::Products(products) if products.is_empty() => "No products".to_string(),
            Reply::Products(products) => products
                .iter()
                .map(|p| self.render_product(p))
                .collect::<Vec<_>>()
                .join("\n"),
            Reply::Product(p) => self.render_product(p),
            Reply::Restocked(r) => format!(
                "Restocked {} +{}: {} on hand, {} available",
                r.barcode, r.added, r.on_hand, r.available
            ),
            Reply::Completed(done) => format!(
                "{}\nChange    {}\nPoints    +{} / -{}",
                self.render_sale(&done.sale),
                self.money(done.change_cents),
                LoyaltyPoints::from_hundredths(done.points_earned),
                LoyaltyPoints::from_hundredths(done.points_redeemed),
            ),
            Reply::Sale(sale) => self.render_sale(sale),
            Reply::Sales(sales) if sales.is_empty() => "No sales".to_string(),
            Reply::Sales(sales) => sales
                .iter()
                .map(|s| {
                    format!(
                        "{}  {}  {:<10} {:>12}{}",
                        s.created_at.format("%Y-%m-%d %H:%M"),
                        s.id,
                        s.cashier,
                        self.money(s.total_cents),
                        if s.refunded { "  REFUNDED" } else { "" }
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Reply::Refund(r) => format!(
                "{} refund of {} for sale {} by {}: {}\nRemaining total {}{}",
                r.entry.kind,
                self.money(r.entry.amount_cents),
                r.entry.sale_id,
                r.entry.processed_by,
                r.entry.items,
                self.money(r.remaining_total_cents),
                if r.sale_refunded { " (sale fully refunded)" } else { "" }
            ),
            Reply::Refunds(entries) if entries.is_empty() => "No refunds".to_string(),
            Reply::Refunds(entries) => entries
                .iter()
                .map(|e| {
                    format!(
                        "{}  {:<7} {}  {} ({})  {}  {}",
                        e.created_at.format("%Y-%m-%d %H:%M"),
                        e.kind.to_string(),
                        e.sale_id,
                        e.processed_by,
                        e.role,
                        self.money(e.amount_cents),
                        e.items
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Reply::Customers(customers) if customers.is_empty() => "No customers".to_string(),
            Reply::Customers(customers) => customers
                .iter()
                .map(render_customer)
                .collect::<Vec<_>>()
                .join("\n"),
            Reply::Customer(c) => render_customer(c),
        }
    }

    fn render_product(&self, p: &ProductDto) -> String {
        format!(
            "{:<8} {:<28} {:>12}  tax {:>6}  stock {:>4}{}",
            p.barcode,
            p.name,
            self.money(p.price_cents),
            TaxRate::from_bps(p.tax_rate_bps).to_string(),
            p.stock,
            if p.low_stock { "  LOW" } else { "" }
        )
    }

    fn render_cart(&self, cart: &CartResponse) -> String {
        if cart.items.is_empty() {
            return "Cart is empty".to_string();
        }

        let mut out = Vec::new();
        for line in &cart.items {
            out.push(format!(
                "{:>3}. {:<28} x{:<4} @ {:>10} {:>12}",
                line.line_no,
                line.name,
                line.quantity,
                self.money(line.unit_price_cents),
                self.money(line.line_total_cents)
            ));
        }
        out.push(format!("Subtotal  {}", self.money(cart.totals.subtotal_cents)));
        if let Some(code) = &cart.promo_code {
            out.push(format!(
                "Discount  -{} ({})",
                self.money(cart.totals.discount_cents),
                code
            ));
        }
        out.push(format!("Tax       {}", self.money(cart.totals.tax_cents)));
        out.push(format!("TOTAL     {}", self.money(cart.totals.total_cents)));
        if let Some(c) = &cart.customer {
            out.push(format!(
                "Customer  {} ({}), {} points",
                c.name,
                c.phone,
                LoyaltyPoints::from_hundredths(c.loyalty_points)
            ));
        }
        for p in &cart.payments {
            out.push(format!("Paid      {} {}", p.method, self.money(p.amount_cents)));
        }
        if !cart.payments.is_empty() {
            out.push(format!("Due       {}", self.money(cart.balance_due_cents)));
        }
        out.join("\n")
    }

    fn render_sale(&self, sale: &SaleDto) -> String {
        let s = &sale.summary;
        let mut out = vec![format!(
            "Sale {}  {}  cashier {}{}",
            s.id,
            s.created_at.format("%Y-%m-%d %H:%M:%S"),
            s.cashier,
            if s.refunded { "  REFUNDED" } else { "" }
        )];
        for line in &sale.lines {
            out.push(format!(
                "{:>3}. {:<28} x{:<4} {:>12}{}",
                line.line_no,
                line.name,
                line.quantity,
                self.money(line.line_total_cents),
                if line.refunded { "  refunded" } else { "" }
            ));
        }
        out.push(format!("Subtotal  {}", self.money(s.subtotal_cents)));
        if let Some(code) = &s.promo_code {
            out.push(format!("Discount  -{} ({})", self.money(s.discount_cents), code));
        }
        out.push(format!("Tax       {}", self.money(s.tax_cents)));
        out.push(format!("TOTAL     {}", self.money(s.total_cents)));
        for p in &sale.payments {
            out.push(format!("Paid      {} {}", p.method, self.money(p.amount_cents)));
        }
        out.join("\n")
    }
}

fn render_customer(c: &CustomerDto) -> String {
    format!(
        "{:<14} {:<24} {:<24} {} points",
        c.phone,
        c.name,
        c.contact,
        LoyaltyPoints::from_hundredths(c.loyalty_points)
    )
}
