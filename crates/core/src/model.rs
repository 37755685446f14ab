use std::error::Error as StdError;
use std::fmt;
use std::path::Path;

macro_rules! boxed_error {
    ($name:ident) => {
        #[derive(Debug)]
        pub struct $name {
            inner: Box<dyn StdError + Send + Sync>,
        }

        impl $name {
            pub fn new<E>(error: E) -> Self
            where
                E: StdError + Send + Sync + 'static,
            {
                Self {
                    inner: Box::new(error),
                }
            }

            pub fn msg(message: impl Into<String>) -> Self {
                let message: String = message.into();
                Self {
                    inner: message.into(),
                }
            }

            pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
                self.inner
            }

            pub fn as_inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
                self.inner.as_ref()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.inner)
            }
        }

        impl StdError for $name {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(self.inner.as_ref())
            }
        }
    };
}

boxed_error!(LanguageModelError);
boxed_error!(ImageSynthesisError);

/// A chat-completion backend. Implementations own their retry policy; an
/// error here means the backend gave up.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, LanguageModelError>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for &M {
    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LanguageModelError> {
        (**self).complete(system_prompt, user_prompt)
    }
}

/// Renders a text prompt into an image file at `output_path`.
pub trait ImageSynthesizer: Send + Sync {
    fn synthesize_image(&self, prompt: &str, output_path: &Path)
        -> Result<(), ImageSynthesisError>;

    /// Extension of the files this backend writes.
    fn file_extension(&self) -> &str {
        "png"
    }
}
