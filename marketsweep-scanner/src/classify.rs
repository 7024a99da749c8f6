//! Keyword classification of listing titles and category names.
//!
//! Both rule tables are ordered slices: the first keyword found in the
//! lower-cased input wins, so reordering entries changes results.

/// Category returned when no keyword matches.
pub const FALLBACK_CATEGORY: &str = "Other";

pub const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("phone", "Mobile Phones"),
    ("car", "Cars"),
    ("laptop", "Laptops"),
    ("computer", "Computers"),
    ("furniture", "Furniture"),
    ("electronics", "Electronics"),
    ("book", "Books"),
    ("clothes", "Clothing"),
    ("shoes", "Footwear"),
    ("property", "Property"),
    ("real estate", "Property"),
    ("bike", "Bicycles"),
    ("motorcycle", "Motorcycles"),
];

pub const FARM_KEYWORDS: &[&str] = &[
    "farm",
    "farming",
    "agriculture",
    "agricultural",
    "garden",
    "gardening",
    "vegetable",
    "fruit",
    "crop",
    "livestock",
    "poultry",
    "eggs",
    "meat",
    "dairy",
    "milk",
    "chicken",
    "fish",
    "seafood",
    "grains",
    "rice",
    "maize",
    "cassava",
    "yam",
    "plantain",
    "banana",
    "tree",
    "nursery",
    "seeds",
    "fertilizer",
    "tractor",
    "agric",
    "cattle",
    "goat",
    "sheep",
    "pig",
    "breed",
    "seedlings",
    "herbs",
    "spices",
];

/// Ordered keyword classifier. The default instance carries the marketplace
/// rule tables above; custom tables keep the same first-match semantics.
#[derive(Debug, Clone)]
pub struct CategoryGuesser {
    categories: Vec<(String, String)>,
    domain_keywords: Vec<String>,
}

impl CategoryGuesser {
    pub fn new(categories: &[(&str, &str)], domain_keywords: &[&str]) -> Self {
        Self {
            categories: categories
                .iter()
                .map(|(keyword, category)| (keyword.to_lowercase(), category.to_string()))
                .collect(),
            domain_keywords: domain_keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn guess_category(&self, title: &str) -> String {
        let title = title.to_lowercase();
        self.categories
            .iter()
            .find(|(keyword, _)| title.contains(keyword.as_str()))
            .map(|(_, category)| category.clone())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
    }

    /// Whether `text` looks farm/agriculture related.
    pub fn is_domain_related(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.domain_keywords
            .iter()
            .any(|keyword| text.contains(keyword.as_str()))
    }
}

impl Default for CategoryGuesser {
    fn default() -> Self {
        Self::new(CATEGORY_KEYWORDS, FARM_KEYWORDS)
    }
}

pub fn guess_category(title: &str) -> String {
    CategoryGuesser::default().guess_category(title)
}

pub fn is_domain_related(text: &str) -> bool {
    CategoryGuesser::default().is_domain_related(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_category_phone() {
        assert_eq!(guess_category("Samsung Galaxy Phone"), "Mobile Phones");
    }

    #[test]
    fn test_guess_category_fallback() {
        assert_eq!(guess_category("Random Item"), "Other");
        assert_eq!(guess_category(""), "Other");
    }

    #[test]
    fn test_guess_category_is_case_insensitive() {
        assert_eq!(guess_category("HP LAPTOP 16GB"), "Laptops");
        assert_eq!(guess_category("Nice Real Estate in Lekki"), "Property");
    }

    #[test]
    fn test_guess_category_first_keyword_wins() {
        // "phone" precedes "car" in the rule table
        assert_eq!(guess_category("Car phone holder"), "Mobile Phones");
        // "car" is a plain substring match, so "Scarf" is a car
        assert_eq!(guess_category("Silk Scarf"), "Cars");
    }

    #[test]
    fn test_is_domain_related() {
        assert!(is_domain_related("Fresh Tomatoes from the Farm"));
        assert!(is_domain_related("LIVESTOCK feed"));
        assert!(!is_domain_related("Used Laptop"));
        assert!(!is_domain_related(""));
    }

    #[test]
    fn test_custom_rule_table_keeps_order() {
        let guesser = CategoryGuesser::new(&[("tv", "Televisions"), ("tv stand", "Furniture")], &[]);
        assert_eq!(guesser.guess_category("TV stand oak"), "Televisions");
        assert!(!guesser.is_domain_related("farm"));
    }
}
