use std::{collections::BTreeMap, fmt, marker::PhantomData, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use thiserror::Error;

use crate::domain::{
    Category, CustomerId, DeviceBrand, DigitalInterest, Gender, ImportId, LocationType,
};

/// `{success, message, data?}` wrapper around every API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// Payload of a successful envelope; `None` when the server reported
    /// failure or sent no data.
    pub fn into_data(self) -> Option<T> {
        if self.success {
            self.data
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: CustomerId,
    pub number: u64,
    pub location_name: String,
    pub date: String,
    pub login_hour: String,
    pub user_name: String,
    pub birth_year: i32,
    /// Derived by the server from `birth_year`.
    #[serde(default)]
    pub actual_age: u32,
    pub gender: Gender,
    pub email: String,
    pub phone_number: String,
    pub device_brand: DeviceBrand,
    pub digital_interest: DigitalInterest,
    pub location_type: LocationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_date_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    pub number: u64,
    pub location_name: String,
    pub date: String,
    pub login_hour: String,
    pub user_name: String,
    pub birth_year: i32,
    pub gender: Gender,
    pub email: String,
    pub phone_number: String,
    pub device_brand: DeviceBrand,
    pub digital_interest: DigitalInterest,
    pub location_type: LocationType,
}

/// Partial update. `number` is immutable and has no field here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_brand: Option<DeviceBrand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_interest: Option<DigitalInterest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<LocationType>,
}

impl UpdateCustomerRequest {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterKey {
    Gender,
    MinAge,
    MaxAge,
    LocationName,
    LocationType,
    DeviceBrand,
    DigitalInterest,
    StartDate,
    EndDate,
}

impl FilterKey {
    pub const ALL: [FilterKey; 9] = [
        FilterKey::Gender,
        FilterKey::MinAge,
        FilterKey::MaxAge,
        FilterKey::LocationName,
        FilterKey::LocationType,
        FilterKey::DeviceBrand,
        FilterKey::DigitalInterest,
        FilterKey::StartDate,
        FilterKey::EndDate,
    ];

    /// Query parameter name.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKey::Gender => "gender",
            FilterKey::MinAge => "minAge",
            FilterKey::MaxAge => "maxAge",
            FilterKey::LocationName => "locationName",
            FilterKey::LocationType => "locationType",
            FilterKey::DeviceBrand => "deviceBrand",
            FilterKey::DigitalInterest => "digitalInterest",
            FilterKey::StartDate => "startDate",
            FilterKey::EndDate => "endDate",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown filter key '{0}'")]
pub struct UnknownFilterKey(pub String);

impl FromStr for FilterKey {
    type Err = UnknownFilterKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFilterKey(s.to_string()))
    }
}

/// Sparse set of active list filters. A key is either present with a
/// non-blank value or absent; blank values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    entries: BTreeMap<FilterKey, String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, or removes it when `value` is blank.
    pub fn set(&mut self, key: FilterKey, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    pub fn with(mut self, key: FilterKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_category<C: Category>(self, key: FilterKey, value: C) -> Self {
        self.with(key, value.as_str())
    }

    pub fn remove(&mut self, key: FilterKey) -> Option<String> {
        self.entries.remove(&key)
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl<K: Into<FilterKey>, V: Into<String>> FromIterator<(K, V)> for FilterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = FilterSet::new();
        for (key, value) in iter {
            set.set(key.into(), value);
        }
        set
    }
}

/// Parameters of one list request, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub page: u32,
    pub size: u32,
    pub search: String,
    pub filters: FilterSet,
}

impl ListRequest {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
        ];
        if !self.search.trim().is_empty() {
            pairs.push(("search".to_string(), self.search.clone()));
        }
        pairs.extend(
            self.filters
                .iter()
                .map(|(key, value)| (key.as_str().to_string(), value.to_string())),
        );
        pairs
    }
}

/// Category → count, keyed by normalized category. Raw keys that fold into
/// the same category are summed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution<C: Category> {
    counts: BTreeMap<C, u64>,
}

impl<C: Category> Default for Distribution<C> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<C: Category> Distribution<C> {
    pub fn add(&mut self, category: C, count: u64) {
        *self.counts.entry(category).or_insert(0) += count;
    }

    /// Zero for categories the server did not report.
    pub fn count(&self, category: C) -> u64 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (C, u64)> + '_ {
        self.counts.iter().map(|(c, n)| (*c, *n))
    }
}

impl<C: Category> FromIterator<(C, u64)> for Distribution<C> {
    fn from_iter<I: IntoIterator<Item = (C, u64)>>(iter: I) -> Self {
        let mut distribution = Distribution::default();
        for (category, count) in iter {
            distribution.add(category, count);
        }
        distribution
    }
}

impl<C: Category> Serialize for Distribution<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (category, count) in &self.counts {
            map.serialize_entry(category.as_str(), count)?;
        }
        map.end()
    }
}

impl<'de, C: Category> Deserialize<'de> for Distribution<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DistributionVisitor<C>(PhantomData<C>);

        impl<'de, C: Category> Visitor<'de> for DistributionVisitor<C> {
            type Value = Distribution<C>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut distribution = Distribution::default();
                while let Some((key, count)) = access.next_entry::<String, u64>()? {
                    distribution.add(C::normalize(&key), count);
                }
                Ok(distribution)
            }
        }

        deserializer.deserialize_map(DistributionVisitor(PhantomData))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub earliest: Option<String>,
    #[serde(default)]
    pub latest: Option<String>,
}

/// Server-computed statistics. Read-only on this side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    #[serde(default)]
    pub total_customers: u64,
    #[serde(default)]
    pub unique_locations: u64,
    #[serde(default)]
    pub avg_age: f64,
    #[serde(default)]
    pub gender_distribution: Distribution<Gender>,
    #[serde(default)]
    pub device_distribution: Distribution<DeviceBrand>,
    #[serde(default)]
    pub location_distribution: Distribution<LocationType>,
    #[serde(default)]
    pub interest_distribution: Distribution<DigitalInterest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPage {
    pub items: Vec<CustomerRecord>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CustomerSummary>,
}

/// List payload. The server answers either with a page object or with the
/// complete result set as a bare array.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerListing {
    Paginated(CustomerPage),
    Unpaginated {
        items: Vec<CustomerRecord>,
        summary: Option<CustomerSummary>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListingWire {
    Page(CustomerPage),
    Bare(Vec<CustomerRecord>),
}

impl<'de> Deserialize<'de> for CustomerListing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ListingWire::deserialize(deserializer)? {
            ListingWire::Page(page) => CustomerListing::Paginated(page),
            ListingWire::Bare(items) => CustomerListing::Unpaginated {
                items,
                summary: None,
            },
        })
    }
}

impl Serialize for CustomerListing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CustomerListing::Paginated(page) => page.serialize(serializer),
            CustomerListing::Unpaginated { items, .. } => items.serialize(serializer),
        }
    }
}

/// Server-reported job status. Strings this client does not recognise
/// decode as `Unknown`, which is never terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportState {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportState::Completed | ImportState::Failed | ImportState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportState::Queued => "queued",
            ImportState::Running => "running",
            ImportState::Completed => "completed",
            ImportState::Failed => "failed",
            ImportState::Cancelled => "cancelled",
            ImportState::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => ImportState::Queued,
            "running" | "processing" => ImportState::Running,
            "completed" => ImportState::Completed,
            "failed" => ImportState::Failed,
            "cancelled" | "canceled" => ImportState::Cancelled,
            _ => ImportState::Unknown,
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ImportState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImportState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ImportState::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub processed_rows: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
}

impl ImportProgress {
    /// Completion percentage in `0..=100`; `None` until the row count is known.
    pub fn percent(&self) -> Option<u8> {
        if self.total_rows == 0 {
            return None;
        }
        let done = self.processed_rows.min(self.total_rows);
        Some(((done * 100) / self.total_rows) as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRowError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    pub message: String,
}

/// Server-owned import job, as last reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobSnapshot {
    #[serde(alias = "id")]
    pub import_id: ImportId,
    #[serde(default)]
    pub status: ImportState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub progress: ImportProgress,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ImportRowError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJobSnapshot {
    /// Snapshot for a job the server acknowledged only by id.
    pub fn queued(import_id: ImportId, file_name: Option<String>) -> Self {
        Self {
            import_id,
            status: ImportState::Queued,
            file_name,
            progress: ImportProgress::default(),
            errors: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Counters of an import the server ran to completion within the upload
/// request, so no job id was issued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    #[serde(flatten)]
    pub progress: ImportProgress,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ImportRowError>,
}

/// What the server hands back for a CSV submission: a bare job id, a job
/// snapshot, or the result of an import that already finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportHandle {
    Id(ImportId),
    Job(ImportJobSnapshot),
    Finished(ImportOutcome),
}

impl ImportHandle {
    pub fn import_id(&self) -> Option<&ImportId> {
        match self {
            ImportHandle::Id(id) => Some(id),
            ImportHandle::Job(job) => Some(&job.import_id),
            ImportHandle::Finished(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    #[serde(default)]
    pub skip_validation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
}

impl ImportOptions {
    /// Text fields of the multipart submission, excluding the file part.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if self.skip_validation {
            fields.push(("skipValidation", "true".to_string()));
        }
        if let Some(continue_on_error) = self.continue_on_error {
            fields.push(("continueOnError", continue_on_error.to_string()));
        }
        if let Some(batch_size) = self.batch_size.filter(|size| *size > 0) {
            fields.push(("batchSize", batch_size.to_string()));
        }
        fields
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
