/// Script uploaded by `init` when no script is given
pub const TEMPLATE_SCRIPT: &str = r#"# /// script
# requires-python = ">=3.10"
# dependencies = [
#     "datasets",
#     "tqdm",
# ]
# ///
"""Template UV script for hfjobs.

This is a template script. Customize it for your needs!

Usage:
    python script.py <input> <output> [--option value]
"""

import argparse
from datasets import load_dataset
from tqdm import tqdm


def main():
    parser = argparse.ArgumentParser(description="Template UV script")
    parser.add_argument("input", help="Input dataset")
    parser.add_argument("output", help="Output dataset")
    parser.add_argument("--text-column", default="text", help="Text column name")

    args = parser.parse_args()

    print(f"Loading dataset: {args.input}")
    dataset = load_dataset(args.input, split="train")

    # Your processing logic here
    print(f"Processing {len(dataset)} examples...")

    def process_example(example):
        return example

    processed = dataset.map(process_example, desc="Processing")

    print(f"Pushing to: {args.output}")
    processed.push_to_hub(args.output)

    print("Done!")


if __name__ == "__main__":
    main()
"#;

/// File name used for [`TEMPLATE_SCRIPT`]
pub const TEMPLATE_SCRIPT_NAME: &str = "script.py";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script_meta::ScriptMeta;

    #[test]
    fn test_template_carries_its_own_metadata() {
        let meta = ScriptMeta::extract(TEMPLATE_SCRIPT);
        assert_eq!(meta.dependencies, vec!["datasets", "tqdm"]);
        assert_eq!(
            meta.description.as_deref(),
            Some("Template UV script for hfjobs.")
        );
    }
}
