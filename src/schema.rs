// Table definitions for the serpwatch store.
// Kept in sync by hand with the DDL in repository/context.rs.

diesel::table! {
    keywords (id) {
        id -> Integer,
        product_name -> Text,
        keyword -> Text,
        priority -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    registered_urls (id) {
        id -> Integer,
        url -> Text,
        product_name -> Text,
        conversion_keyword -> Text,
        content_type -> Text,
        keyword -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    crawl_jobs (id) {
        id -> Integer,
        job_date -> Text,
        total_keywords -> Integer,
        total_servers -> Integer,
        report_sent -> Integer,
        started_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    crawl_results (id) {
        id -> Integer,
        job_id -> Integer,
        keyword_id -> Integer,
        server_id -> Integer,
        status -> Text,
        payload -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(crawl_results -> crawl_jobs (job_id));

diesel::allow_tables_to_appear_in_same_query!(keywords, registered_urls, crawl_jobs, crawl_results,);
