//! Catalog vocabulary: stores, categories, regions and the product records
//! returned by the upstream product API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value that is not part of an enumerated catalog vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownValue {}

/// Declares a string-backed catalog enum with its wire name and i18n label key.
macro_rules! catalog_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => ($wire:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }

            pub fn label_key(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

catalog_enum! {
    /// Convenience store chain.
    Store, "store" {
        SevenEleven => ("SevenEleven", "product.store.sevenEleven"),
        Lawson => ("Lawson", "product.store.lawson"),
        FamilyMart => ("FamilyMart", "product.store.familyMart"),
    }
}

catalog_enum! {
    Category, "category" {
        Onigiri => ("Onigiri", "product.category.onigiri"),
        Bento => ("Bento", "product.category.bento"),
        Sushi => ("Sushi", "product.category.sushi"),
        Sandwich => ("Sandwich", "product.category.sandwich"),
        Bread => ("Bread", "product.category.bread"),
        Noodle => ("Noodle", "product.category.noodle"),
        Pasta => ("Pasta", "product.category.pasta"),
        Salad => ("Salad", "product.category.salad"),
        SideDish => ("SideDish", "product.category.sideDish"),
        FriedFood => ("FriedFood", "product.category.friedFood"),
        SteamedBun => ("SteamedBun", "product.category.steamedBun"),
        Oden => ("Oden", "product.category.oden"),
        Gratin => ("Gratin", "product.category.gratin"),
        Takoyaki => ("Takoyaki", "product.category.takoyaki"),
        Sweets => ("Sweets", "product.category.sweets"),
        Alcohol => ("Alcohol", "product.category.alcohol"),
        Drink => ("Drink", "product.category.drink"),
        Frozen => ("Frozen", "product.category.frozen"),
        Other => ("Other", "product.category.other"),
    }
}

catalog_enum! {
    /// Sales region within Japan.
    Region, "region" {
        Hokkaido => ("Hokkaido", "product.region.hokkaido"),
        Tohoku => ("Tohoku", "product.region.tohoku"),
        Kanto => ("Kanto", "product.region.kanto"),
        Tokai => ("Tokai", "product.region.tokai"),
        Hokuriku => ("Hokuriku", "product.region.hokuriku"),
        Kansai => ("Kansai", "product.region.kansai"),
        ChugokuShikoku => ("ChugokuShikoku", "product.region.chugokuShikoku"),
        Kyushu => ("Kyushu", "product.region.kyushu"),
        Okinawa => ("Okinawa", "product.region.okinawa"),
    }
}

impl Region {
    /// Map a Japanese region (or prefecture) label as printed by the stores.
    pub fn from_japanese(label: &str) -> Option<Region> {
        let region = match label.trim() {
            "北海道" => Region::Hokkaido,
            "東北" => Region::Tohoku,
            "関東" => Region::Kanto,
            "東海" => Region::Tokai,
            "北陸" => Region::Hokuriku,
            "関西" => Region::Kansai,
            "中国・四国" | "中国" | "四国" => Region::ChugokuShikoku,
            "九州" | "宮崎" | "鹿児島" => Region::Kyushu,
            "沖縄" => Region::Okinawa,
            _ => return None,
        };
        Some(region)
    }
}

/// Text in Japanese with optional English and Chinese translations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub ja: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zh: Option<String>,
}

/// Product as exposed by the upstream API. Read-only on this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProduct {
    pub id: String,
    pub title: LocalizedText,
    pub description: LocalizedText,
    pub price: f64,
    #[serde(default)]
    pub images: Vec<String>,
    pub url: String,
    pub store: Store,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<Region>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
}

/// One page of a product listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<PublicProduct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl ProductPage {
    pub fn has_more(&self) -> bool {
        has_more(self)
    }
}

/// True iff another page follows `last_page`.
pub fn has_more(last_page: &ProductPage) -> bool {
    last_page.next_cursor.is_some()
}

#[cfg(test)]
pub(crate) fn sample_product(id: &str, store: Store) -> PublicProduct {
    PublicProduct {
        id: id.to_string(),
        title: LocalizedText {
            ja: format!("商品 {id}"),
            en: Some(format!("Product {id}")),
            zh: None,
        },
        description: LocalizedText::default(),
        price: 298.0,
        images: vec![format!("https://img.example.com/{id}.jpg")],
        url: format!("https://store.example.com/items/{id}"),
        store,
        release_date: None,
        category: Some(Category::Onigiri),
        regions: None,
        is_new: None,
    }
}
