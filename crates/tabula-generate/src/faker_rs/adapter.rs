use chrono::NaiveDateTime;
use fake::Fake;
use rand::{Rng, RngCore};

use crate::expr::ExprError;
use crate::faker_rs::dates;
use crate::faker_rs::locales::{LocaleKey, localized};
use crate::functions::CallArgs;
use crate::value::GeneratedValue;

const ASCII_LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const COLOR_NAMES: &[&str] = &[
    "AliceBlue", "Aqua", "Beige", "Black", "Blue", "Brown", "Coral", "Crimson", "DarkGreen",
    "Gold", "Gray", "Green", "Indigo", "Ivory", "Khaki", "Lavender", "Lime", "Magenta",
    "Maroon", "Navy", "Olive", "Orange", "Orchid", "Pink", "Purple", "Red", "Salmon", "Silver",
    "Teal", "Tomato", "Turquoise", "Violet", "White", "Yellow",
];

/// Generate `method` with Faker-compatible arguments. `None` when the method
/// is not provided.
pub fn generate_value(
    method: &str,
    locale: LocaleKey,
    clock: NaiveDateTime,
    args: &CallArgs,
    rng: &mut dyn RngCore,
) -> Option<Result<GeneratedValue, ExprError>> {
    if let Some(result) = dates::generate(method, args, clock, rng) {
        return Some(result);
    }
    generate_other(method, locale, args, rng).transpose()
}

fn text(value: String) -> Result<Option<GeneratedValue>, ExprError> {
    Ok(Some(GeneratedValue::Text(value)))
}

fn generate_other(
    method: &str,
    locale: LocaleKey,
    args: &CallArgs,
    rng: &mut dyn RngCore,
) -> Result<Option<GeneratedValue>, ExprError> {
    match method {
        "name" | "name_male" | "name_female" => text(localized!(locale, rng, name::Name())),
        "first_name" | "first_name_male" | "first_name_female" => {
            text(localized!(locale, rng, name::FirstName()))
        }
        "last_name" => text(localized!(locale, rng, name::LastName())),
        "prefix" => text(localized!(locale, rng, name::Title())),
        "suffix" => text(localized!(locale, rng, name::Suffix())),

        "email" | "free_email" => text(localized!(locale, rng, internet::FreeEmail())),
        "safe_email" => text(localized!(locale, rng, internet::SafeEmail())),
        "company_email" => {
            let user: String = localized!(locale, rng, internet::Username());
            let domain = domain_name(locale, rng);
            text(format!("{user}@{domain}"))
        }
        "user_name" | "username" => text(localized!(locale, rng, internet::Username())),
        "password" => {
            let length = args.int(0, "length", 10)?.max(1) as usize;
            text(localized!(locale, rng, internet::Password(length..length + 1)))
        }
        "ipv4" => text(localized!(locale, rng, internet::IPv4())),
        "ipv6" => text(localized!(locale, rng, internet::IPv6())),
        "mac_address" => text(localized!(locale, rng, internet::MACAddress())),
        "user_agent" => text(localized!(locale, rng, internet::UserAgent())),
        "free_email_domain" => text(localized!(locale, rng, internet::FreeEmailProvider())),
        "tld" => text(localized!(locale, rng, internet::DomainSuffix())),
        "domain_word" => text(domain_word(locale, rng)),
        "domain_name" => text(domain_name(locale, rng)),
        "url" => text(format!("https://www.{}/", domain_name(locale, rng))),

        "address" => {
            let street = street_address(locale, rng);
            let city: String = localized!(locale, rng, address::CityName());
            let state: String = localized!(locale, rng, address::StateAbbr());
            let zip: String = localized!(locale, rng, address::ZipCode());
            text(match locale {
                LocaleKey::EnUs => format!("{street}\n{city}, {state} {zip}"),
                LocaleKey::PtBr => format!("{street}\n{zip} {city} / {state}"),
            })
        }
        "street_address" => text(street_address(locale, rng)),
        "street_name" => text(localized!(locale, rng, address::StreetName())),
        "building_number" => text(localized!(locale, rng, address::BuildingNumber())),
        "secondary_address" => text(localized!(locale, rng, address::SecondaryAddress())),
        "city" => text(localized!(locale, rng, address::CityName())),
        "state" => text(localized!(locale, rng, address::StateName())),
        "state_abbr" => text(localized!(locale, rng, address::StateAbbr())),
        "postcode" => text(localized!(locale, rng, address::PostCode())),
        "zipcode" => text(localized!(locale, rng, address::ZipCode())),
        "country" => text(localized!(locale, rng, address::CountryName())),
        "country_code" => text(localized!(locale, rng, address::CountryCode())),
        "timezone" => text(localized!(locale, rng, address::TimeZone())),
        "latitude" => Ok(Some(GeneratedValue::Float(round_to(
            rng.random_range(-90.0..=90.0),
            6,
        )))),
        "longitude" => Ok(Some(GeneratedValue::Float(round_to(
            rng.random_range(-180.0..=180.0),
            6,
        )))),

        "company" => text(localized!(locale, rng, company::CompanyName())),
        "company_suffix" => text(localized!(locale, rng, company::CompanySuffix())),
        "catch_phrase" => text(localized!(locale, rng, company::CatchPhrase())),
        "bs" => text(localized!(locale, rng, company::Bs())),
        "industry" => text(localized!(locale, rng, company::Industry())),
        "job" => text(localized!(locale, rng, job::Title())),

        "word" => text(localized!(locale, rng, lorem::Word())),
        "words" => {
            let count = args.int(0, "nb", 3)?.max(0) as usize;
            let words = (0..count)
                .map(|_| GeneratedValue::Text(localized!(locale, rng, lorem::Word())))
                .collect();
            Ok(Some(GeneratedValue::List(words)))
        }
        "sentence" => {
            let words = args.int(0, "nb_words", 6)?.max(1) as usize;
            let variable = args.flag(1, "variable_nb_words", true);
            text(sentence(locale, words, variable, rng))
        }
        "sentences" => {
            let count = args.int(0, "nb", 3)?.max(0) as usize;
            let sentences = (0..count)
                .map(|_| GeneratedValue::Text(sentence(locale, 6, true, rng)))
                .collect();
            Ok(Some(GeneratedValue::List(sentences)))
        }
        "paragraph" => {
            let count = args.int(0, "nb_sentences", 3)?.max(1) as usize;
            text(paragraph(locale, count, rng))
        }
        "paragraphs" => {
            let count = args.int(0, "nb", 3)?.max(0) as usize;
            let paragraphs = (0..count)
                .map(|_| GeneratedValue::Text(paragraph(locale, 3, rng)))
                .collect();
            Ok(Some(GeneratedValue::List(paragraphs)))
        }
        "text" => {
            let limit = args.int(0, "max_nb_chars", 200)?;
            if limit < 5 {
                return Err(ExprError::runtime("text() can only generate text of at least 5 characters"));
            }
            text(bounded_text(locale, limit as usize, rng))
        }

        "phone_number" => text(localized!(locale, rng, phone_number::PhoneNumber())),
        "cellphone_number" | "msisdn" => text(localized!(locale, rng, phone_number::CellNumber())),

        "boolean" => {
            let chance = args.int(0, "chance_of_getting_true", 50)?;
            Ok(Some(GeneratedValue::Bool(rng.random_range(1..=100) <= chance)))
        }
        "pybool" => {
            let chance = args.int(0, "truth_probability", 50)?;
            Ok(Some(GeneratedValue::Bool(rng.random_range(1..=100) <= chance)))
        }
        "uuid4" => {
            let mut bytes = [0_u8; 16];
            rng.fill_bytes(&mut bytes);
            let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
            Ok(Some(GeneratedValue::Uuid(uuid.to_string())))
        }
        "hex_color" => text(fake::faker::color::en::HexColor().fake_with_rng(rng)),
        "rgb_color" => text(fake::faker::color::en::RgbColor().fake_with_rng(rng)),
        "color_name" => text(COLOR_NAMES[rng.random_range(0..COLOR_NAMES.len())].to_string()),
        "currency_code" => text(fake::faker::currency::en::CurrencyCode().fake_with_rng(rng)),
        "currency_name" => text(fake::faker::currency::en::CurrencyName().fake_with_rng(rng)),
        "currency_symbol" => text(fake::faker::currency::en::CurrencySymbol().fake_with_rng(rng)),
        "credit_card_number" => {
            text(fake::faker::creditcard::en::CreditCardNumber().fake_with_rng(rng))
        }
        "isbn10" => text(fake::faker::barcode::en::Isbn10().fake_with_rng(rng)),
        "isbn13" => text(fake::faker::barcode::en::Isbn13().fake_with_rng(rng)),
        "file_name" => text(fake::faker::filesystem::en::FileName().fake_with_rng(rng)),
        "file_extension" => text(fake::faker::filesystem::en::FileExtension().fake_with_rng(rng)),
        "file_path" => text(fake::faker::filesystem::en::FilePath().fake_with_rng(rng)),
        "mime_type" => text(fake::faker::filesystem::en::MimeType().fake_with_rng(rng)),

        "random_int" | "pyint" => {
            let (min_name, max_name) = if method == "pyint" {
                ("min_value", "max_value")
            } else {
                ("min", "max")
            };
            let min = args.int(0, min_name, 0)?;
            let max = args.int(1, max_name, 9999)?;
            let step = args.int(2, "step", 1)?;
            if step <= 0 || max < min {
                return Err(ExprError::runtime(format!(
                    "empty range for {method}({min}, {max}, step={step})"
                )));
            }
            let steps = (max - min) / step;
            Ok(Some(GeneratedValue::Int(min + step * rng.random_range(0..=steps))))
        }
        "random_digit" => Ok(Some(GeneratedValue::Int(rng.random_range(0..=9)))),
        "random_digit_not_null" => Ok(Some(GeneratedValue::Int(rng.random_range(1..=9)))),
        "random_number" => {
            let digits = match args.present(0, "digits") {
                Some(_) => args.int(0, "digits", 0)?,
                None => rng.random_range(1..=9),
            };
            if !(0..=18).contains(&digits) {
                return Err(ExprError::runtime("random_number() digits must be between 0 and 18"));
            }
            let upper = 10_i64.pow(digits as u32) - 1;
            let lower = if args.flag(1, "fix_len", false) && digits > 0 {
                10_i64.pow(digits as u32 - 1)
            } else {
                0
            };
            Ok(Some(GeneratedValue::Int(rng.random_range(lower..=upper.max(lower)))))
        }
        "pyfloat" | "pydecimal" => pyfloat(args, rng).map(Some),
        "random_element" => {
            let elements = args
                .get(0, "elements")
                .cloned()
                .unwrap_or_else(|| GeneratedValue::List(vec!["a".into(), "b".into(), "c".into()]));
            pick_element(&elements, rng).map(Some)
        }
        "random_elements" => {
            let elements = args
                .get(0, "elements")
                .cloned()
                .unwrap_or_else(|| GeneratedValue::List(vec!["a".into(), "b".into(), "c".into()]));
            random_elements(&elements, args, rng).map(Some)
        }
        "random_letter" => text(random_char(ASCII_LETTERS, rng).to_string()),
        "random_lowercase_letter" => text(random_char(&ASCII_LETTERS[..26], rng).to_string()),
        "random_uppercase_letter" => text(random_char(&ASCII_LETTERS[26..], rng).to_string()),
        "numerify" => {
            let template = args.text(0, "text")?.unwrap_or_else(|| "###".to_string());
            text(numerify(&template, rng))
        }
        "lexify" => {
            let template = args.text(0, "text")?.unwrap_or_else(|| "????".to_string());
            let letters = args.text(1, "letters")?.unwrap_or_else(|| ASCII_LETTERS.to_string());
            text(lexify(&template, &letters, rng))
        }
        "bothify" => {
            let template = args.text(0, "text")?.unwrap_or_else(|| "## ??".to_string());
            let letters = args.text(1, "letters")?.unwrap_or_else(|| ASCII_LETTERS.to_string());
            let numbered = numerify(&template, rng);
            text(lexify(&numbered, &letters, rng))
        }
        "pystr" => {
            let max = args.int(1, "max_chars", 20)?.max(0) as usize;
            let min = match args.present(0, "min_chars") {
                Some(_) => args.int(0, "min_chars", 0)?.max(0) as usize,
                None => max,
            };
            let length = if min >= max { max } else { rng.random_range(min..=max) };
            text((0..length).map(|_| random_char(ASCII_LETTERS, rng)).collect())
        }
        _ => Ok(None),
    }
}

fn domain_word(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    let word: String = localized!(locale, rng, name::LastName());
    word.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn domain_name(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    let word = domain_word(locale, rng);
    let suffix: String = localized!(locale, rng, internet::DomainSuffix());
    format!("{word}.{suffix}")
}

fn street_address(locale: LocaleKey, rng: &mut dyn RngCore) -> String {
    let number: String = localized!(locale, rng, address::BuildingNumber());
    let street: String = localized!(locale, rng, address::StreetName());
    match locale {
        LocaleKey::EnUs => format!("{number} {street}"),
        LocaleKey::PtBr => format!("{street}, {number}"),
    }
}

/// Around `words` words (±40% when variable), capitalized, ending in a period.
fn sentence(locale: LocaleKey, words: usize, variable: bool, rng: &mut dyn RngCore) -> String {
    let count = if variable {
        let low = ((words as f64) * 0.6).round().max(1.0) as usize;
        let high = ((words as f64) * 1.4).round().max(low as f64) as usize;
        rng.random_range(low..=high)
    } else {
        words
    };
    let words: Vec<String> = (0..count)
        .map(|_| localized!(locale, rng, lorem::Word()))
        .collect();
    let mut text = words.join(" ");
    if let Some(first) = text.get(..1) {
        text = format!("{}{}", first.to_uppercase(), &text[1..]);
    }
    text.push('.');
    text
}

fn paragraph(locale: LocaleKey, sentences: usize, rng: &mut dyn RngCore) -> String {
    (0..sentences)
        .map(|_| sentence(locale, 6, true, rng))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bounded_text(locale: LocaleKey, limit: usize, rng: &mut dyn RngCore) -> String {
    let mut text = String::new();
    loop {
        let next = sentence(locale, 6, true, rng);
        let separator = usize::from(!text.is_empty());
        if text.len() + separator + next.len() > limit {
            break;
        }
        if separator == 1 {
            text.push(' ');
        }
        text.push_str(&next);
    }
    if text.is_empty() {
        let mut words = String::new();
        loop {
            let word: String = localized!(locale, rng, lorem::Word());
            if words.len() + word.len() + 2 > limit {
                break;
            }
            if !words.is_empty() {
                words.push(' ');
            }
            words.push_str(&word);
        }
        if let Some(first) = words.get(..1) {
            words = format!("{}{}", first.to_uppercase(), &words[1..]);
        }
        words.push('.');
        text = words;
    }
    text
}

fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10_f64.powi(digits);
    (value * scale).round() / scale
}

fn pyfloat(args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    let right = match args.present(1, "right_digits") {
        Some(_) => args.int(1, "right_digits", 0)?.clamp(0, 15) as i32,
        None => rng.random_range(0..=6),
    };
    let positive = args.flag(2, "positive", false);
    let min = args.present(3, "min_value").map(|_| args.float(3, "min_value", 0.0)).transpose()?;
    let max = args.present(4, "max_value").map(|_| args.float(4, "max_value", 0.0)).transpose()?;

    let value = match (min, max) {
        (Some(min), Some(max)) if min > max => {
            return Err(ExprError::runtime("pyfloat() min_value must be less than max_value"));
        }
        (Some(min), Some(max)) => rng.random_range(min..=max),
        (Some(min), None) => rng.random_range(min..=min + 1_000_000.0),
        (None, Some(max)) => {
            let low = if positive { 0.0 } else { max - 1_000_000.0 };
            rng.random_range(low.min(max)..=max)
        }
        (None, None) => {
            let left = match args.present(0, "left_digits") {
                Some(_) => args.int(0, "left_digits", 0)?.clamp(0, 15) as i32,
                None => rng.random_range(1..=6),
            };
            let magnitude = rng.random_range(0.0..10_f64.powi(left));
            if positive || rng.random_bool(0.5) {
                magnitude
            } else {
                -magnitude
            }
        }
    };
    Ok(GeneratedValue::Float(round_to(value, right)))
}

fn pick_element(elements: &GeneratedValue, rng: &mut dyn RngCore) -> Result<GeneratedValue, ExprError> {
    match elements {
        GeneratedValue::List(items) if !items.is_empty() => {
            Ok(items[rng.random_range(0..items.len())].clone())
        }
        GeneratedValue::Dict(entries) if !entries.is_empty() => {
            let mut cumulative = Vec::with_capacity(entries.len());
            let mut total = 0.0;
            for (key, weight) in entries {
                let weight = weight.as_f64().ok_or_else(|| {
                    ExprError::runtime(format!("weight for {key} is not a number"))
                })?;
                total += weight.max(0.0);
                cumulative.push(total);
            }
            let target = rng.random::<f64>() * total;
            let index = cumulative
                .partition_point(|weight| *weight < target)
                .min(entries.len() - 1);
            Ok(entries[index].0.clone())
        }
        GeneratedValue::Text(value) if !value.is_empty() => {
            let chars: Vec<char> = value.chars().collect();
            Ok(GeneratedValue::Text(chars[rng.random_range(0..chars.len())].to_string()))
        }
        other => Err(ExprError::runtime(format!(
            "cannot choose from an empty or non-sequence {}",
            other.type_name()
        ))),
    }
}

fn random_elements(
    elements: &GeneratedValue,
    args: &CallArgs,
    rng: &mut dyn RngCore,
) -> Result<GeneratedValue, ExprError> {
    let pool: Vec<GeneratedValue> = match elements {
        GeneratedValue::List(items) => items.clone(),
        GeneratedValue::Dict(entries) => entries.iter().map(|(key, _)| key.clone()).collect(),
        other => {
            return Err(ExprError::runtime(format!(
                "random_elements() needs a list, got {}",
                other.type_name()
            )));
        }
    };
    if pool.is_empty() {
        return Ok(GeneratedValue::List(Vec::new()));
    }
    let unique = args.flag(2, "unique", false);
    let length = match args.present(1, "length") {
        Some(_) => args.int(1, "length", 1)?.max(0) as usize,
        None => rng.random_range(1..=pool.len()),
    };
    if unique {
        if length > pool.len() {
            return Err(ExprError::runtime(
                "sample length cannot be larger than the number of unique elements",
            ));
        }
        let mut indices: Vec<usize> = (0..pool.len()).collect();
        for position in 0..length {
            let swap = rng.random_range(position..pool.len());
            indices.swap(position, swap);
        }
        return Ok(GeneratedValue::List(
            indices[..length].iter().map(|index| pool[*index].clone()).collect(),
        ));
    }
    let mut picked = Vec::with_capacity(length);
    for _ in 0..length {
        picked.push(pick_element(elements, rng)?);
    }
    Ok(GeneratedValue::List(picked))
}

fn random_char(alphabet: &str, rng: &mut dyn RngCore) -> char {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        return '?';
    }
    chars[rng.random_range(0..chars.len())]
}

/// `#` any digit, `%` non-zero digit, `!` digit or nothing, `@` non-zero digit or nothing.
fn numerify(template: &str, rng: &mut dyn RngCore) -> String {
    let mut out = String::with_capacity(template.len());
    for ch in template.chars() {
        match ch {
            '#' => out.push(random_char("0123456789", rng)),
            '%' => out.push(random_char("123456789", rng)),
            '!' => {
                if rng.random_bool(0.5) {
                    out.push(random_char("0123456789", rng));
                }
            }
            '@' => {
                if rng.random_bool(0.5) {
                    out.push(random_char("123456789", rng));
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn lexify(template: &str, letters: &str, rng: &mut dyn RngCore) -> String {
    template
        .chars()
        .map(|ch| if ch == '?' { random_char(letters, rng) } else { ch })
        .collect()
}
