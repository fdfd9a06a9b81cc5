pub mod domain;
pub mod library;
pub mod ports;
pub mod validation;

pub use domain::{
    AiFeatures, AiProfile, Attributes, Book, BookId, EmailNotifications, ProcessingState, Profile,
    Progress, ReadingGoals, ReadingHistory, ReadingLevel, ReadingPatterns, ReadingPreferences,
    ReadingProfile, ReadingProfileId, ReadingStatus, RecommendedBook, Subscription, User, UserId,
    UserPreferences,
};
pub use library::Library;
pub use ports::{DocumentStore, PortError, PortResult};
pub use validation::{Validate, ValidationError};
