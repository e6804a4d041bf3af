//! Field constraints applied before any create/update leaves the client.

use std::sync::OnceLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use shared::{
    domain::{Category, DeviceBrand, DigitalInterest, Gender, LocationType},
    error::ValidationErrors,
    protocol::{CreateCustomerRequest, CustomerRecord, UpdateCustomerRequest},
};

pub const MIN_BIRTH_YEAR: i32 = 1900;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email pattern compiles")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

fn current_year() -> i32 {
    Utc::now().year()
}

fn check_required(errors: &mut ValidationErrors, field: &str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errors.push(field, message);
    }
}

fn check_birth_year(errors: &mut ValidationErrors, birth_year: i32) {
    if birth_year < MIN_BIRTH_YEAR {
        errors.push("birthYear", "Valid birth year is required");
    } else if birth_year > current_year() {
        errors.push("birthYear", "Birth year cannot be in the future");
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !is_valid_email(email) {
        errors.push("email", "Valid email is required");
    }
}

pub fn validate_create(request: &CreateCustomerRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if request.number < 1 {
        errors.push("number", "Customer number is required");
    }
    check_required(&mut errors, "locationName", &request.location_name, "Location name is required");
    check_required(&mut errors, "date", &request.date, "Date is required");
    check_required(&mut errors, "loginHour", &request.login_hour, "Login hour is required");
    check_required(&mut errors, "userName", &request.user_name, "User name is required");
    check_birth_year(&mut errors, request.birth_year);
    check_email(&mut errors, &request.email);
    check_required(&mut errors, "phoneNumber", &request.phone_number, "Phone number is required");
    errors.into_result(())
}

/// Only supplied fields are checked; a supplied field must satisfy the same
/// constraint it has on create.
pub fn validate_update(request: &UpdateCustomerRequest) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(value) = &request.location_name {
        check_required(&mut errors, "locationName", value, "Location name is required");
    }
    if let Some(value) = &request.date {
        check_required(&mut errors, "date", value, "Date is required");
    }
    if let Some(value) = &request.login_hour {
        check_required(&mut errors, "loginHour", value, "Login hour is required");
    }
    if let Some(value) = &request.user_name {
        check_required(&mut errors, "userName", value, "User name is required");
    }
    if let Some(value) = request.birth_year {
        check_birth_year(&mut errors, value);
    }
    if let Some(value) = &request.email {
        check_email(&mut errors, value);
    }
    if let Some(value) = &request.phone_number {
        check_required(&mut errors, "phoneNumber", value, "Phone number is required");
    }
    errors.into_result(())
}

/// Customer fields as typed by a user. `None` means the field was left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerForm {
    pub number: Option<String>,
    pub location_name: Option<String>,
    pub date: Option<String>,
    pub login_hour: Option<String>,
    pub user_name: Option<String>,
    pub birth_year: Option<String>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub device_brand: Option<String>,
    pub digital_interest: Option<String>,
    pub location_type: Option<String>,
}

impl CustomerForm {
    /// Prefills an edit form from a stored record, normalizing categories.
    pub fn from_record(record: &CustomerRecord) -> Self {
        Self {
            number: Some(record.number.to_string()),
            location_name: Some(record.location_name.clone()),
            date: Some(record.date.clone()),
            login_hour: Some(record.login_hour.clone()),
            user_name: Some(record.user_name.clone()),
            birth_year: Some(record.birth_year.to_string()),
            gender: Some(record.gender.as_str().to_string()),
            email: Some(record.email.clone()),
            phone_number: Some(record.phone_number.clone()),
            device_brand: Some(record.device_brand.as_str().to_string()),
            digital_interest: Some(record.digital_interest.as_str().to_string()),
            location_type: Some(record.location_type.as_str().to_string()),
        }
    }

    pub fn into_create_request(self) -> Result<CreateCustomerRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let number = match self.number.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match raw.parse::<u64>() {
                Ok(number) => number,
                Err(_) => {
                    errors.push("number", "Customer number must be a positive integer");
                    0
                }
            },
            _ => {
                errors.push("number", "Customer number is required");
                0
            }
        };
        let birth_year = match self.birth_year.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match raw.parse::<i32>() {
                Ok(year) => year,
                Err(_) => {
                    errors.push("birthYear", "Valid birth year is required");
                    current_year()
                }
            },
            _ => {
                errors.push("birthYear", "Valid birth year is required");
                current_year()
            }
        };
        let gender = required_category::<Gender>(
            &mut errors,
            "gender",
            self.gender.as_deref(),
            "Gender is required",
        );
        let device_brand = required_category::<DeviceBrand>(
            &mut errors,
            "deviceBrand",
            self.device_brand.as_deref(),
            "Device brand is required",
        );
        let digital_interest = required_category::<DigitalInterest>(
            &mut errors,
            "digitalInterest",
            self.digital_interest.as_deref(),
            "Digital interest is required",
        );
        let location_type = required_category::<LocationType>(
            &mut errors,
            "locationType",
            self.location_type.as_deref(),
            "Location type is required",
        );

        let request = CreateCustomerRequest {
            number,
            location_name: self.location_name.unwrap_or_default(),
            date: self.date.unwrap_or_default(),
            login_hour: self.login_hour.unwrap_or_default(),
            user_name: self.user_name.unwrap_or_default(),
            birth_year,
            gender,
            email: self.email.unwrap_or_default(),
            phone_number: self.phone_number.unwrap_or_default(),
            device_brand,
            digital_interest,
            location_type,
        };

        // Unparseable numbers were already reported; skip their range checks.
        let parse_failed: Vec<String> = errors.errors().iter().map(|e| e.field.clone()).collect();
        if let Err(field_errors) = validate_create(&request) {
            for error in field_errors.errors() {
                if !parse_failed.contains(&error.field) {
                    errors.push(error.field.clone(), error.message.clone());
                }
            }
        }
        errors.into_result(request)
    }

    /// `number` is ignored: it cannot change after creation.
    pub fn into_update_request(self) -> Result<UpdateCustomerRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let birth_year = match self.birth_year.as_deref().map(str::trim) {
            None => None,
            Some(raw) => match raw.parse::<i32>() {
                Ok(year) => Some(year),
                Err(_) => {
                    errors.push("birthYear", "Valid birth year is required");
                    None
                }
            },
        };

        let request = UpdateCustomerRequest {
            location_name: self.location_name,
            date: self.date,
            login_hour: self.login_hour,
            user_name: self.user_name,
            birth_year,
            gender: optional_category::<Gender>(&mut errors, "gender", self.gender.as_deref()),
            email: self.email,
            phone_number: self.phone_number,
            device_brand: optional_category::<DeviceBrand>(
                &mut errors,
                "deviceBrand",
                self.device_brand.as_deref(),
            ),
            digital_interest: optional_category::<DigitalInterest>(
                &mut errors,
                "digitalInterest",
                self.digital_interest.as_deref(),
            ),
            location_type: optional_category::<LocationType>(
                &mut errors,
                "locationType",
                self.location_type.as_deref(),
            ),
        };

        if let Err(field_errors) = validate_update(&request) {
            for error in field_errors.errors() {
                errors.push(error.field.clone(), error.message.clone());
            }
        }
        errors.into_result(request)
    }
}

fn required_category<C: Category>(
    errors: &mut ValidationErrors,
    field: &str,
    raw: Option<&str>,
    missing: &str,
) -> C {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => {
            errors.push(field, missing);
            C::FALLBACK
        }
        Some(raw) => C::parse(raw).unwrap_or_else(|| {
            errors.push(field, invalid_choice::<C>());
            C::FALLBACK
        }),
    }
}

fn optional_category<C: Category>(
    errors: &mut ValidationErrors,
    field: &str,
    raw: Option<&str>,
) -> Option<C> {
    let raw = raw?;
    match C::parse(raw.trim()) {
        Some(value) => Some(value),
        None => {
            errors.push(field, invalid_choice::<C>());
            None
        }
    }
}

fn invalid_choice<C: Category>() -> String {
    let choices: Vec<&str> = C::ALL.iter().map(|c| c.as_str()).collect();
    format!("must be one of: {}", choices.join(", "))
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
