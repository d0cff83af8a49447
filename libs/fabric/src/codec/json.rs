use crate::codec::Serializer;
use crate::error::{Error, Result};

/// JSON codec, handy when the payload should stay human readable
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub const CODE: u8 = 2;
}

impl Serializer for JsonSerializer {
    fn code(&self) -> u8 {
        Self::CODE
    }

    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(Error::codec)
    }

    fn decode_with(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn erased_serde::Deserializer<'_>) -> Result<()>,
    ) -> Result<()> {
        let mut de = serde_json::Deserializer::from_slice(bytes);
        {
            let mut erased = <dyn erased_serde::Deserializer>::erase(&mut de);
            visit(&mut erased)?;
        }
        de.end().map_err(Error::codec)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct GetByIdResp {
        msg: String,
    }

    #[test]
    fn encodes_plain_json() {
        let serializer: Arc<dyn Serializer> = Arc::new(JsonSerializer);
        let value = GetByIdResp {
            msg: "hello, world".to_string(),
        };

        let bytes = serializer.encode_value(&value).unwrap();
        assert_eq!(bytes, br#"{"msg":"hello, world"}"#);

        let decoded: GetByIdResp = serializer.decode_value(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let serializer: Arc<dyn Serializer> = Arc::new(JsonSerializer);
        let result = serializer.decode_value::<GetByIdResp>(br#"{"msg":"x"} extra"#);
        assert!(matches!(result, Err(Error::Codec(_))));
    }
}
