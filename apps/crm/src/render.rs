use client_core::{query::page_window, ListView};
use shared::{
    domain::Category,
    protocol::{
        CustomerRecord, CustomerSummary, Distribution, ImportJobSnapshot, ImportOutcome,
        ImportRowError,
    },
};

pub fn customer_table(view: &ListView) -> String {
    let mut out = format!(
        "{:<8} {:<24} {:<18} {:<30} {:<5} {:<8} {:<14} {:<10}\n",
        "NUMBER", "ID", "USER", "EMAIL", "AGE", "GENDER", "DEVICE", "LOCATION"
    );
    for customer in &view.customers {
        out.push_str(&customer_row(customer));
        out.push('\n');
    }
    out
}

fn customer_row(customer: &CustomerRecord) -> String {
    format!(
        "{:<8} {:<24} {:<18} {:<30} {:<5} {:<8} {:<14} {:<10}",
        customer.number,
        customer.id.as_str(),
        customer.user_name,
        customer.email,
        customer.actual_age,
        customer.gender.label(),
        customer.device_brand.label(),
        customer.location_type.label(),
    )
}

pub fn customer_detail(customer: &CustomerRecord) -> String {
    let rows = [
        ("Id", customer.id.to_string()),
        ("Number", customer.number.to_string()),
        ("User name", customer.user_name.clone()),
        ("Email", customer.email.clone()),
        ("Phone", customer.phone_number.clone()),
        ("Birth year", customer.birth_year.to_string()),
        ("Age", customer.actual_age.to_string()),
        ("Gender", customer.gender.label().to_string()),
        ("Location", customer.location_name.clone()),
        ("Location type", customer.location_type.label().to_string()),
        ("Device", customer.device_brand.label().to_string()),
        ("Interest", customer.digital_interest.label().to_string()),
        ("Date", customer.date.clone()),
        ("Login hour", customer.login_hour.clone()),
        ("Created", customer.created_at.to_rfc3339()),
        ("Updated", customer.updated_at.to_rfc3339()),
    ];
    rows.iter()
        .map(|(label, value)| format!("{label:<14} {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn pager(page: u32, total_pages: u32) -> Option<String> {
    if total_pages <= 1 {
        return None;
    }
    let pages: Vec<String> = page_window(page, total_pages)
        .into_iter()
        .map(|n| if n == page { format!("[{n}]") } else { n.to_string() })
        .collect();
    Some(format!("Pages: {} of {total_pages}", pages.join(" ")))
}

pub fn summary(summary: &CustomerSummary) -> String {
    let mut out = format!(
        "Total customers:  {}\nUnique locations: {}\nAverage age:      {:.1}\n",
        summary.total_customers, summary.unique_locations, summary.avg_age
    );
    if let Some(range) = &summary.date_range {
        out.push_str(&format!(
            "Date range:       {} .. {}\n",
            range.earliest.as_deref().unwrap_or("-"),
            range.latest.as_deref().unwrap_or("-")
        ));
    }
    out.push_str(&distribution("Gender", &summary.gender_distribution));
    out.push_str(&distribution("Device", &summary.device_distribution));
    out.push_str(&distribution("Location type", &summary.location_distribution));
    out.push_str(&distribution("Interest", &summary.interest_distribution));
    out
}

fn distribution<C: Category>(title: &str, distribution: &Distribution<C>) -> String {
    let mut out = format!("\n{title}:\n");
    for category in C::ALL {
        let count = distribution.count(*category);
        if count > 0 {
            out.push_str(&format!("  {:<16} {count}\n", category.label()));
        }
    }
    out
}

pub fn import_job(job: &ImportJobSnapshot) -> String {
    let progress = match job.progress.percent() {
        Some(percent) => format!(
            "{}/{} rows ({percent}%)",
            job.progress.processed_rows, job.progress.total_rows
        ),
        None => "waiting for row count".to_string(),
    };
    let mut line = format!(
        "{} [{}] {} ok={} errors={}",
        job.import_id, job.status, progress, job.progress.success_count, job.progress.error_count
    );
    if let Some(file) = &job.file_name {
        line.push_str(&format!(" file={file}"));
    }
    push_row_errors(&mut line, &job.errors);
    line
}

pub fn import_outcome(outcome: &ImportOutcome) -> String {
    let mut line = format!(
        "Import finished: {} rows, ok={} errors={}",
        outcome.progress.total_rows, outcome.progress.success_count, outcome.progress.error_count
    );
    push_row_errors(&mut line, &outcome.errors);
    line
}

fn push_row_errors(line: &mut String, errors: &[ImportRowError]) {
    for error in errors {
        match error.row {
            Some(row) => line.push_str(&format!("\n  row {row}: {}", error.message)),
            None => line.push_str(&format!("\n  {}", error.message)),
        }
    }
}
