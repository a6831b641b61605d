//! Printable HTML for invoices and order vouchers. Formatting only, every
//! value coming from a row is escaped.

use crate::models::client::Client;
use crate::models::driver::Driver;
use crate::models::invoice::{Invoice, InvoiceStatus};
use crate::models::order::Order;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}table{border-collapse:collapse;width:100%}\
td,th{border:1px solid #ccc;padding:6px;text-align:left}.total{font-weight:bold}";

pub fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn row(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!(
        "<tr><th>{}</th><td>{}</td></tr>\n",
        html_escape(label),
        html_escape(value)
    ));
}

fn open(out: &mut String, title: &str) {
    out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
    out.push_str(&format!("<title>{}</title>", html_escape(title)));
    out.push_str(&format!("<style>{STYLE}</style></head><body>\n"));
}

fn euros(amount: f64) -> String {
    format!("{amount:.2} EUR")
}

pub fn render_invoice_html(invoice: &Invoice, client: &Client) -> String {
    let mut out = String::new();
    open(&mut out, &format!("Invoice {}", invoice.reference));

    out.push_str(&format!("<h1>Invoice {}</h1>\n", html_escape(&invoice.reference)));
    out.push_str(&format!(
        "<p>Period: {:02}/{}</p>\n",
        invoice.month, invoice.year
    ));

    out.push_str("<h2>Billed to</h2>\n<table>\n");
    row(&mut out, "Company", &client.company_name);
    row(&mut out, "Client code", &client.internal_code);
    if let Some(contact) = &client.contact_name {
        row(&mut out, "Contact", contact);
    }
    let address: Vec<&str> = [
        client.billing.street.as_deref(),
        client.billing.postal_code.as_deref(),
        client.billing.city.as_deref(),
        client.billing.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !address.is_empty() {
        row(&mut out, "Address", &address.join(", "));
    }
    if let Some(siret) = &client.billing.siret {
        row(&mut out, "SIRET", siret);
    }
    out.push_str("</table>\n");

    out.push_str("<h2>Amounts</h2>\n<table>\n");
    row(&mut out, "Deliveries", &invoice.order_count.to_string());
    row(&mut out, "Total HT", &euros(invoice.amount_ht));
    row(&mut out, "TVA", &euros(invoice.amount_tva));
    out.push_str(&format!(
        "<tr class=\"total\"><th>Total TTC</th><td>{}</td></tr>\n",
        html_escape(&euros(invoice.amount_ttc))
    ));
    out.push_str("</table>\n");

    let status = match invoice.status {
        InvoiceStatus::Pending => "Pending".to_string(),
        InvoiceStatus::Overdue => "Overdue".to_string(),
        InvoiceStatus::Paid => match invoice.paid_at {
            Some(at) => format!("Paid on {}", at.format("%d/%m/%Y")),
            None => "Paid".to_string(),
        },
    };
    out.push_str(&format!(
        "<p>Due date: {}. Status: {}.</p>\n",
        invoice.due_date.format("%d/%m/%Y"),
        html_escape(&status)
    ));

    out.push_str("</body></html>\n");
    out
}

pub fn render_order_voucher_html(order: &Order, client: &Client, driver: Option<&Driver>) -> String {
    let mut out = String::new();
    open(&mut out, &format!("Voucher {}", order.reference));

    out.push_str(&format!("<h1>Delivery voucher {}</h1>\n<table>\n", html_escape(&order.reference)));
    row(&mut out, "Client", &client.company_name);
    row(&mut out, "Formula", order.formula.as_str());
    row(&mut out, "Status", order.status.as_str());
    row(
        &mut out,
        "Pickup",
        &format!("{}, {}", order.pickup.street, order.pickup.city),
    );
    row(
        &mut out,
        "Delivery",
        &format!("{}, {}", order.delivery.street, order.delivery.city),
    );
    if let Some(scheduled) = order.scheduled_pickup_at {
        row(&mut out, "Scheduled pickup", &scheduled.format("%d/%m/%Y %H:%M").to_string());
    }
    if let Some(package) = &order.package_description {
        row(&mut out, "Package", package);
    }
    if let Some(notes) = &order.notes {
        row(&mut out, "Notes", notes);
    }
    if let Some(driver) = driver {
        row(&mut out, "Driver", &driver.full_name());
    }
    if let Some(delivered) = order.delivered_at {
        row(&mut out, "Delivered", &delivered.format("%d/%m/%Y %H:%M").to_string());
    }
    out.push_str(&format!(
        "<tr class=\"total\"><th>Price</th><td>{}</td></tr>\n</table>\n",
        html_escape(&euros(order.price))
    ));
    out.push_str("<p>Recipient signature:</p>\n</body></html>\n");
    out
}
