/*!
 * Lock Key Derivation
 * Deterministic keys from method identity and call arguments
 */

use super::descriptor::LockDesc;
use crate::core::errors::StageError;
use crate::core::types::{InlineString, MethodId, Value};

/// Derive the lock key for one call.
///
/// With a key template naming a declared parameter, the key is
/// `Type::method:<scalar value>` (or a hash when the argument is compound).
/// Without a template, the key hashes all arguments, so distinct argument
/// tuples contend on distinct keys.
pub fn derive_lock_key(
    desc: &LockDesc,
    method: &MethodId,
    params: &[InlineString],
    args: &[Value],
) -> Result<String, StageError> {
    let suffix = match &desc.key_template {
        Some(template) => {
            let index = params
                .iter()
                .position(|p| p == template)
                .ok_or_else(|| StageError::ArgumentBinding {
                    parameter: template.clone(),
                    method: InlineString::from(method.to_string().as_str()),
                })?;
            let arg = args.get(index).ok_or_else(|| StageError::ArgumentBinding {
                parameter: template.clone(),
                method: InlineString::from(method.to_string().as_str()),
            })?;
            match arg.scalar_fragment() {
                Some(fragment) => fragment,
                None => format!("{:x}", arg.stable_hash()),
            }
        }
        None => {
            let combined = Value::List(args.to_vec());
            format!("{:x}", combined.stable_hash())
        }
    };
    Ok(format!("{}:{}", method, suffix))
}
