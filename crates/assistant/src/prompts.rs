//! Prompt composition for the three recommendation pipelines.
//!
//! Each prompt opens with a distinct role line (the scripted test client
//! keys on it) and closes with the exact JSON shape the caller will
//! validate against.

use relist_core::domain::article::{Article, CompletedSale};
use relist_core::market::MarketStats;
use relist_core::pricing::PriceBand;

pub const PRICING_ROLE: &str = "You are a pricing analyst for a secondhand marketplace reseller.";
pub const PROACTIVE_ROLE: &str = "You are a listing coach for a secondhand marketplace reseller.";
pub const SCHEDULE_ROLE: &str =
    "You are a listing scheduler for a secondhand marketplace reseller.";
pub const BUNDLE_COPY_ROLE: &str = "You are a copywriter for a secondhand marketplace reseller.";

fn article_line(article: &Article) -> String {
    format!(
        "- id={} title={:?} brand={} condition={} price={}",
        article.id.0,
        article.title,
        article.brand.as_deref().unwrap_or("unknown"),
        article.condition,
        article.price,
    )
}

fn sale_line(sale: &CompletedSale) -> String {
    format!(
        "- title={:?} brand={} condition={} sold_price={}",
        sale.title,
        sale.brand.as_deref().unwrap_or("unknown"),
        sale.condition,
        sale.sold_price.map(|price| price.to_string()).unwrap_or_else(|| "unknown".to_string()),
    )
}

fn stats_line(stats: &MarketStats) -> String {
    format!(
        "- segment={}/{}/{} avg={} min={} max={} sales={}",
        stats.segment.brand,
        stats.segment.category,
        stats.segment.condition,
        stats.avg_sold_price,
        stats.min_sold_price,
        stats.max_sold_price,
        stats.total_sales,
    )
}

pub fn pricing_prompt(
    candidates: &[(&Article, &PriceBand)],
    history: &[CompletedSale],
    stats: &[MarketStats],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(PRICING_ROLE);
    prompt.push_str(
        "\nSuggest better prices for the listed inventory using the market statistics and sale history below.\n",
    );

    prompt.push_str("\nInventory with reference price bands:\n");
    for (article, band) in candidates {
        prompt.push_str(&article_line(article));
        prompt.push_str(&format!(" band_min={} band_max={} band_avg={}\n", band.min, band.max, band.avg));
    }

    prompt.push_str("\nMarket statistics (most observed segments first):\n");
    for entry in stats {
        prompt.push_str(&stats_line(entry));
        prompt.push('\n');
    }

    prompt.push_str("\nRecent completed sales:\n");
    for sale in history.iter().take(50) {
        prompt.push_str(&sale_line(sale));
        prompt.push('\n');
    }

    prompt.push_str(
        "\nReturn 3 to 5 suggestions as a JSON object of this exact shape and nothing else:\n\
         {\"insights\":[{\"article_id\":\"...\",\"suggested_price\":0.0,\"reasoning\":\"...\",\"confidence\":0.0}]}\n\
         Only reference article ids from the inventory above. Keep suggested prices inside the band.\n",
    );
    prompt
}

pub fn proactive_prompt(inventory: &[Article], history: &[CompletedSale]) -> String {
    let mut prompt = String::new();
    prompt.push_str(PROACTIVE_ROLE);
    prompt.push_str(
        "\nReview the inventory and sale history and point out concrete improvement opportunities: \
         listings ready to publish, stale listings, seasonal timing, incomplete listings, bundling \
         opportunities, and titles or descriptions worth rewriting for search.\n",
    );

    prompt.push_str("\nInventory:\n");
    for article in inventory {
        prompt.push_str(&article_line(article));
        prompt.push('\n');
    }

    prompt.push_str("\nRecent completed sales:\n");
    for sale in history.iter().take(50) {
        prompt.push_str(&sale_line(sale));
        prompt.push('\n');
    }

    prompt.push_str(
        "\nReturn 3 to 5 items as a JSON object of this exact shape and nothing else:\n\
         {\"insights\":[{\"insight_type\":\"ready_to_list|stale_listing|seasonal_timing|incomplete_listing|bundle_opportunity|seo_enrichment\",\
         \"priority\":\"high|medium|low\",\"title\":\"...\",\"message\":\"...\",\"action_label\":\"...\",\
         \"article_ids\":[\"...\"],\"suggested_action\":{\"type\":\"create_bundle\",\"article_ids\":[\"...\"]}}]}\n\
         `suggested_action` is optional and only valid for bundle opportunities with at least two articles.\n",
    );
    prompt
}

pub fn schedule_prompt(inventory: &[Article]) -> String {
    let mut prompt = String::new();
    prompt.push_str(SCHEDULE_ROLE);
    prompt.push_str(
        "\nSuggest when the articles below should be listed or re-listed for the best visibility.\n",
    );

    prompt.push_str("\nInventory:\n");
    for article in inventory {
        prompt.push_str(&article_line(article));
        prompt.push('\n');
    }

    prompt.push_str(
        "\nReturn up to 5 suggestions as a JSON object of this exact shape and nothing else:\n\
         {\"insights\":[{\"priority\":\"high|medium|low\",\"title\":\"...\",\"message\":\"...\",\
         \"article_ids\":[\"...\"]}]}\n\
         Name the concrete day and time window in the message.\n",
    );
    prompt
}

pub fn bundle_copy_prompt(members: &[Article]) -> String {
    let mut prompt = String::new();
    prompt.push_str(BUNDLE_COPY_ROLE);
    prompt.push_str("\nWrite a short title and description for a bundle of these articles:\n");

    for article in members {
        prompt.push_str(&article_line(article));
        prompt.push('\n');
    }

    prompt.push_str(
        "\nReturn a JSON object of this exact shape and nothing else:\n\
         {\"title\":\"...\",\"description\":\"...\"}\n",
    );
    prompt
}
