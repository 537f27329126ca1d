//! Column and table name constants shared by the readers, cleaning steps and reports.

// Table names
pub const ARCHIVE_TABLE: &str = "archive";
pub const PREDICTIONS_TABLE: &str = "image_predictions";
pub const ENGAGEMENT_TABLE: &str = "tweet_info";
pub const MASTER_TABLE: &str = "master";

// Join key shared by all three tables once the readers have renamed `tweet_id`
pub const ID: &str = "id";
pub const TWEET_ID: &str = "tweet_id";

// Archive columns
pub const IN_REPLY_TO_STATUS_ID: &str = "in_reply_to_status_id";
pub const IN_REPLY_TO_USER_ID: &str = "in_reply_to_user_id";
pub const TIMESTAMP: &str = "timestamp";
pub const SOURCE: &str = "source";
pub const TEXT: &str = "text";
pub const RETWEETED_STATUS_ID: &str = "retweeted_status_id";
pub const RETWEETED_STATUS_USER_ID: &str = "retweeted_status_user_id";
pub const RETWEETED_STATUS_TIMESTAMP: &str = "retweeted_status_timestamp";
pub const EXPANDED_URLS: &str = "expanded_urls";
pub const RATING_NUMERATOR: &str = "rating_numerator";
pub const RATING_DENOMINATOR: &str = "rating_denominator";
pub const NAME: &str = "name";
pub const DOGGO: &str = "doggo";
pub const FLOOFER: &str = "floofer";
pub const PUPPER: &str = "pupper";
pub const PUPPO: &str = "puppo";

pub const ARCHIVE_COLUMNS: [&str; 17] = [
    TWEET_ID,
    IN_REPLY_TO_STATUS_ID,
    IN_REPLY_TO_USER_ID,
    TIMESTAMP,
    SOURCE,
    TEXT,
    RETWEETED_STATUS_ID,
    RETWEETED_STATUS_USER_ID,
    RETWEETED_STATUS_TIMESTAMP,
    EXPANDED_URLS,
    RATING_NUMERATOR,
    RATING_DENOMINATOR,
    NAME,
    DOGGO,
    FLOOFER,
    PUPPER,
    PUPPO,
];

pub const REPOST_COLUMNS: [&str; 3] = [
    RETWEETED_STATUS_ID,
    RETWEETED_STATUS_USER_ID,
    RETWEETED_STATUS_TIMESTAMP,
];

/// Life-stage columns in the order their labels are joined into `dog_stage`.
pub const STAGE_COLUMNS: [&str; 4] = [DOGGO, FLOOFER, PUPPER, PUPPO];
pub const DOG_STAGE: &str = "dog_stage";
pub const STAGE_SEPARATOR: &str = ", ";
/// Placeholder the archive uses for an unset life-stage or name.
pub const NONE_PLACEHOLDER: &str = "None";

// Engagement columns
pub const FAVORITE_COUNT: &str = "favorite_count";
pub const RETWEET_COUNT: &str = "retweet_count";

// Prediction columns
pub const JPG_URL: &str = "jpg_url";
pub const IMG_NUM: &str = "img_num";

pub const PREDICTION_COLUMNS: [&str; 12] = [
    TWEET_ID, JPG_URL, IMG_NUM, "p1", "p1_conf", "p1_dog", "p2", "p2_conf", "p2_dog", "p3",
    "p3_conf", "p3_dog",
];
